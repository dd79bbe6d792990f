pub mod files;
pub mod meta;
pub mod serve;
pub mod sync;

// Re-export command functions for convenience
pub use files::{files, FilesParams, OutputFormat};
pub use meta::{collectors, projects};
pub use serve::{serve, ServeParams};
pub use sync::{sync, SyncParams};

use anyhow::{Context, Result};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;

use bgpfinder::config::Config;
use bgpfinder::crawler::HttpListing;
use bgpfinder::error::{ClassifiedError, Error};
use bgpfinder::finder::MultiFinder;
use bgpfinder::storage::PostgresStore;

/// Load configuration from `path` or the environment
///
/// Validation is left to the caller so command-line overrides apply first.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    Ok(config)
}

/// Build the multi-provider finder, scraping every collector list
pub async fn build_finder(config: &Config) -> Result<Arc<MultiFinder>> {
    let listing = Arc::new(
        HttpListing::with_config(&config.http).context("Failed to create listing client")?,
    );
    let finder = MultiFinder::from_archives(listing, &config.archives)
        .await
        .map_err(|e| report(e.into(), "Failed to load collector lists"))?;

    tracing::info!(
        collectors = bgpfinder::finder::Finder::collectors(&finder, "").len(),
        "Collector lists loaded"
    );
    Ok(Arc::new(finder))
}

/// Connect to the cache store and bootstrap its schema
pub async fn connect_store(config: &Config) -> Result<Arc<PostgresStore>> {
    let store = PostgresStore::connect(&config.database)
        .await
        .map_err(|e| report(e.into(), "Failed to connect to PostgreSQL"))?;
    store
        .ensure_schema()
        .await
        .map_err(|e| report(e.into(), "Failed to initialize cache store schema"))?;

    let (in_use, max) = store.pool_usage();
    tracing::info!(
        host = %config.database.host,
        port = config.database.port,
        pool_in_use = in_use,
        pool_max = max,
        "Cache store ready"
    );
    Ok(Arc::new(store))
}

/// Log a startup failure with its classification and hand it back with context
fn report(err: Error, context: &'static str) -> anyhow::Error {
    tracing::error!(
        category = err.category().as_str(),
        recoverable = err.is_recoverable(),
        error = %err,
        "{context}"
    );
    anyhow::Error::new(err).context(context)
}

/// Shutdown channel flipped to `true` on SIGINT or SIGTERM
pub fn shutdown_channel() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(forward_shutdown(wait_for_signal(), tx));
    rx
}

/// Flip `tx` once `signal` completes
async fn forward_shutdown(signal: impl Future<Output = ()>, tx: watch::Sender<bool>) {
    signal.await;
    tracing::info!("Shutdown signal received");
    if tx.send(true).is_err() {
        tracing::debug!("No shutdown listeners left");
    }
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
