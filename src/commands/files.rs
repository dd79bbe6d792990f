use anyhow::{Context, Result};
use std::str::FromStr;

use bgpfinder::config::Config;
use bgpfinder::finder::Finder;
use bgpfinder::models::{BgpDump, Collector, DumpKind};
use bgpfinder::query::Query;
use bgpfinder::utils::parse_time;

use super::build_finder;

/// Output format of the `files` command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Csv,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(format!("unknown format '{other}' (expected json or csv)")),
        }
    }
}

/// Parameters for the files command
#[derive(Debug, Clone)]
pub struct FilesParams {
    pub from: String,
    pub until: String,
    pub project: Option<String>,
    pub collectors: Vec<String>,
    pub dump_type: String,
    pub format: OutputFormat,
}

/// Run a live find and print the matching dumps
pub async fn files(config: &Config, params: FilesParams) -> Result<()> {
    let from = parse_time(&params.from).context("Invalid --from")?;
    let until = parse_time(&params.until).context("Invalid --until")?;
    let kind = DumpKind::parse(&params.dump_type)
        .with_context(|| format!("Invalid --type: {}", params.dump_type))?;

    let finder = build_finder(config).await?;
    let collectors = resolve_collectors(
        finder.as_ref(),
        params.project.as_deref().unwrap_or(""),
        &params.collectors,
    )?;

    let query = Query::new(from, until)
        .with_collectors(collectors)
        .with_kind(kind);
    let dumps = finder.find(&query).await?;

    tracing::info!(
        dumps = dumps.len(),
        from = %from,
        until = %until,
        dump_type = %kind,
        "Find complete"
    );

    print!("{}", render(&dumps, params.format)?);
    Ok(())
}

/// Turn `--project` and `--collector` flags into the query's collector set
///
/// With only a project, every collector of that project is searched. Named
/// collectors must exist and belong to the project when one is given.
fn resolve_collectors(
    finder: &dyn Finder,
    project: &str,
    names: &[String],
) -> Result<Vec<Collector>> {
    if !project.is_empty() && finder.project(project).is_none() {
        anyhow::bail!("Unknown project: {project}");
    }

    if names.is_empty() {
        if project.is_empty() {
            return Ok(Vec::new());
        }
        return Ok(finder.collectors(project));
    }

    let mut collectors = Vec::with_capacity(names.len());
    for name in names {
        let collector = finder
            .collector(name)
            .with_context(|| format!("Unknown collector: {name}"))?;
        if !project.is_empty() && collector.project.name != project {
            anyhow::bail!("Collector {name} does not belong to project {project}");
        }
        if !collectors.contains(&collector) {
            collectors.push(collector);
        }
    }
    Ok(collectors)
}

fn render(dumps: &[BgpDump], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            let mut out = serde_json::to_string_pretty(dumps)?;
            out.push('\n');
            Ok(out)
        }
        OutputFormat::Csv => {
            let mut out = String::from("project,collector,type,timestamp,duration,url\n");
            for dump in dumps {
                out.push_str(&dump.as_csv());
                out.push('\n');
            }
            Ok(out)
        }
    }
}
