use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use std::sync::Arc;

use bgpfinder::config::Config;
use bgpfinder::scheduler::{SyncPair, SyncScheduler};
use bgpfinder::storage::{DumpStore, MemoryStore};

use super::{build_finder, connect_store, shutdown_channel};

/// Parameters for the sync command
#[derive(Debug, Clone, Default)]
pub struct SyncParams {
    /// Keep results in memory instead of PostgreSQL
    pub dry_run: bool,

    /// `PAIR=TIME` first-start overrides
    pub starts: Vec<String>,

    /// Restrict to these pairs (all when empty)
    pub pairs: Vec<String>,
}

/// Run only the sync scheduler until shutdown
pub async fn sync(mut config: Config, params: SyncParams) -> Result<()> {
    config.database.enabled = !params.dry_run;
    config.sync.enabled = !params.dry_run;
    config.validate()?;

    let pairs = params
        .pairs
        .iter()
        .map(|p| p.parse::<SyncPair>().map_err(anyhow::Error::msg))
        .collect::<Result<Vec<_>>>()?;
    let backfill = Utc
        .timestamp_opt(config.sync.backfill_from, 0)
        .single()
        .context("sync.backfill_from is out of range")?;

    let finder = build_finder(&config).await?;
    let memory = params.dry_run.then(|| Arc::new(MemoryStore::new()));
    let store: Arc<dyn DumpStore> = match &memory {
        Some(memory) => Arc::clone(memory) as Arc<dyn DumpStore>,
        None => connect_store(&config).await? as Arc<dyn DumpStore>,
    };

    let mut scheduler = SyncScheduler::new(finder, store)
        .with_backfill_from(backfill)
        .with_start_args(&params.starts)?;
    if !pairs.is_empty() {
        scheduler = scheduler.with_pairs(&pairs);
    }

    tracing::info!(
        pairs = ?scheduler.pairs().iter().map(ToString::to_string).collect::<Vec<_>>(),
        dry_run = params.dry_run,
        "Sync scheduler configured"
    );

    scheduler.run(shutdown_channel()).await;

    if let Some(memory) = memory {
        println!("Dry run finished: {} dumps discovered", memory.dump_count());
    }
    Ok(())
}
