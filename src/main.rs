mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bgpfinder::config::LoggingConfig;
use commands::{FilesParams, OutputFormat, ServeParams, SyncParams};

#[derive(Parser)]
#[command(
    name = "bgpf",
    version,
    about = "Find BGP RIB and update dumps published by RouteViews and RIPE RIS",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the configured format
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// TOML configuration file (environment variables are used otherwise)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the supported projects
    Projects,

    /// List collectors as project,name
    Collectors {
        /// Only collectors of this project
        #[arg(short, long)]
        project: Option<String>,
    },

    /// Find dump files in a time window
    Files {
        /// Window start (RFC 3339, "YYYY-MM-DD HH:MM:SS", "YYYY-MM-DD" or epoch seconds)
        #[arg(long)]
        from: String,

        /// Window end, exclusive
        #[arg(long)]
        until: String,

        /// Only collectors of this project
        #[arg(short, long)]
        project: Option<String>,

        /// Collector to search (repeatable)
        #[arg(short, long = "collector")]
        collectors: Vec<String>,

        /// Dump type (any, rib, updates)
        #[arg(short = 't', long = "type", default_value = "any")]
        dump_type: String,

        /// Output format (json, csv)
        #[arg(short, long, default_value = "json")]
        format: OutputFormat,
    },

    /// Run the REST server
    Serve {
        /// Host to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to bind
        #[arg(long)]
        port: Option<u16>,

        /// Serve from the PostgreSQL cache store
        #[arg(long, default_value = "false")]
        use_db: bool,
    },

    /// Run only the sync scheduler
    Sync {
        /// Keep discovered dumps in memory instead of PostgreSQL
        #[arg(long, default_value = "false")]
        dry_run: bool,

        /// First run of a pair at a given time, e.g. ris/updates=2024-01-01T00:00:00Z (repeatable)
        #[arg(long = "start")]
        starts: Vec<String>,

        /// Only sync these pairs, e.g. routeviews/rib (repeatable)
        #[arg(long = "pair")]
        pairs: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = commands::load_config(cli.config.as_deref())?;

    // Initialize tracing/logging
    setup_tracing(&config.logging, cli.log_format.as_deref(), cli.verbose);

    if let Err(e) = bgpfinder::metrics::init_metrics() {
        tracing::warn!(error = %e, "Failed to register metrics");
    }

    match cli.command {
        Commands::Projects => {
            tracing::info!("Starting projects command");
            config.validate()?;
            commands::projects(&config).await?;
        }

        Commands::Collectors { project } => {
            tracing::info!(project = ?project, "Starting collectors command");
            config.validate()?;
            commands::collectors(&config, project).await?;
        }

        Commands::Files {
            from,
            until,
            project,
            collectors,
            dump_type,
            format,
        } => {
            tracing::info!(
                from = %from,
                until = %until,
                project = ?project,
                collectors = ?collectors,
                dump_type = %dump_type,
                "Starting files command"
            );
            config.validate()?;
            let params = FilesParams {
                from,
                until,
                project,
                collectors,
                dump_type,
                format,
            };
            commands::files(&config, params).await?;
        }

        Commands::Serve { host, port, use_db } => {
            tracing::info!(
                host = ?host,
                port = ?port,
                use_db = %use_db,
                "Starting serve command"
            );
            commands::serve(config, ServeParams { host, port, use_db }).await?;
        }

        Commands::Sync {
            dry_run,
            starts,
            pairs,
        } => {
            tracing::info!(
                dry_run = %dry_run,
                starts = ?starts,
                pairs = ?pairs,
                "Starting sync command"
            );
            let params = SyncParams {
                dry_run,
                starts,
                pairs,
            };
            commands::sync(config, params).await?;
        }
    }

    Ok(())
}

/// `RUST_LOG` wins over the configured level unless `--verbose` is given;
/// `--log-format` wins over the configured format.
fn setup_tracing(logging: &LoggingConfig, format: Option<&str>, verbose: bool) {
    let configured = || EnvFilter::new(logging.filter_directives(verbose));
    let env_filter = if verbose {
        configured()
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| configured())
    };

    // Logs go to stderr so `files` output stays machine-readable
    match format.unwrap_or(logging.format.as_str()) {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
                .init();
        }
    }
}
