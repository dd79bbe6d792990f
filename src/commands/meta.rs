use anyhow::Result;

use bgpfinder::config::Config;
use bgpfinder::finder::Finder;

use super::build_finder;

/// Print every served project, one per line
pub async fn projects(config: &Config) -> Result<()> {
    let finder = build_finder(config).await?;
    for project in finder.projects() {
        println!("{}", project.as_csv());
    }
    Ok(())
}

/// Print collectors as `project,name`, optionally for one project
pub async fn collectors(config: &Config, project: Option<String>) -> Result<()> {
    let finder = build_finder(config).await?;
    let project = project.unwrap_or_default();
    if !project.is_empty() && finder.project(&project).is_none() {
        anyhow::bail!("Unknown project: {project}");
    }

    for collector in finder.collectors(&project) {
        println!("{}", collector.as_csv());
    }
    Ok(())
}
