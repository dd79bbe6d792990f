use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use std::sync::Arc;

use bgpfinder::config::Config;
use bgpfinder::finder::Finder;
use bgpfinder::scheduler::SyncScheduler;
use bgpfinder::server::{ApiServer, AppState};
use bgpfinder::storage::DumpStore;
use bgpfinder::utils::retry::wait_for_shutdown;

use super::{build_finder, connect_store, shutdown_channel};

/// Parameters for the serve command
#[derive(Debug, Clone, Default)]
pub struct ServeParams {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub use_db: bool,
}

/// Run the REST server, plus the sync scheduler when enabled
pub async fn serve(mut config: Config, params: ServeParams) -> Result<()> {
    if let Some(host) = params.host {
        config.server.host = host;
    }
    if let Some(port) = params.port {
        config.server.port = port;
    }
    if params.use_db {
        config.database.enabled = true;
    }
    config.validate()?;

    println!("Starting bgpfinder server...");
    println!("  Address: {}:{}", config.server.host, config.server.port);
    println!("  Cache store: {}", if config.database.enabled { "postgres" } else { "disabled" });
    println!("  Sync: {}", if config.sync.enabled { "enabled" } else { "disabled" });
    println!();

    let finder = build_finder(&config).await?;
    let store: Option<Arc<dyn DumpStore>> = if config.database.enabled {
        Some(connect_store(&config).await? as Arc<dyn DumpStore>)
    } else {
        None
    };

    let shutdown = shutdown_channel();

    let scheduler = match (&store, config.sync.enabled) {
        (Some(store), true) => {
            let backfill = Utc
                .timestamp_opt(config.sync.backfill_from, 0)
                .single()
                .context("sync.backfill_from is out of range")?;
            let scheduler = SyncScheduler::new(finder.clone(), Arc::clone(store))
                .with_backfill_from(backfill);
            let rx = shutdown.clone();
            Some(tokio::spawn(async move { scheduler.run(rx).await }))
        }
        _ => None,
    };

    let state = AppState::new(finder as Arc<dyn Finder>, store);
    let server = ApiServer::new(config.server.clone(), state);

    let mut rx = shutdown.clone();
    server
        .start_with_shutdown(async move { wait_for_shutdown(&mut rx).await })
        .await?;

    if let Some(handle) = scheduler {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Sync scheduler task failed");
        }
    }

    println!("Server stopped");
    Ok(())
}
