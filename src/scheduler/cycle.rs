//! One synchronization cycle of a pair
//!
//! Every collector of the pair's project is synced concurrently. A collector
//! is searched from its watermark to `started + forward_margin`, retried with
//! exponential backoff, and its dumps are written as soon as they are found.
//! Only collectors that succeeded get their collector row and sync state
//! advanced, so a failed collector is searched from the same watermark next
//! cycle.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::error::{SyncError, SyncResult};
use super::policy::{SyncPair, SyncPolicy};
use crate::finder::Finder;
use crate::metrics;
use crate::models::{BgpDump, Collector, Project, SyncState};
use crate::query::Query;
use crate::storage::DumpStore;
use crate::utils::retry::{with_retry, RetryError};

/// Outcome of one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub pair: SyncPair,

    /// Cycle start; becomes `last_completed_crawl` of every synced collector
    pub started: DateTime<Utc>,

    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    pub dumps_found: usize,
    pub dumps_written: usize,

    /// Shutdown interrupted at least one collector
    pub cancelled: bool,
}

impl CycleReport {
    fn new(pair: SyncPair, started: DateTime<Utc>) -> Self {
        Self {
            pair,
            started,
            succeeded: Vec::new(),
            failed: Vec::new(),
            dumps_found: 0,
            dumps_written: 0,
            cancelled: false,
        }
    }
}

struct CollectorSync {
    dumps: Vec<BgpDump>,
    written: usize,
}

/// Borrowed context of a running cycle
pub struct Cycle<'a> {
    pub finder: &'a dyn Finder,
    pub store: &'a dyn DumpStore,
    pub pair: SyncPair,
    pub policy: &'a SyncPolicy,

    /// Lower bound for collectors with no sync state yet
    pub backfill_from: DateTime<Utc>,
}

impl Cycle<'_> {
    /// Run the cycle as if it started at `started`
    ///
    /// # Errors
    ///
    /// `SyncError::Store` if sync states cannot be read or the final
    /// collector and state upserts fail. Per-collector failures are reported
    /// in [`CycleReport::failed`] instead.
    pub async fn run(
        &self,
        started: DateTime<Utc>,
        shutdown: &watch::Receiver<bool>,
    ) -> SyncResult<CycleReport> {
        let clock = tokio::time::Instant::now();
        let pair_label = self.pair.to_string();
        let project = Project::new(self.pair.provider.name());
        let mut report = CycleReport::new(self.pair, started);

        let collectors = self.finder.collectors(&project.name);
        if collectors.is_empty() {
            warn!(pair = %pair_label, "No collectors known, skipping cycle");
            return Ok(report);
        }

        let states: HashMap<String, SyncState> = self
            .store
            .sync_states(&project, self.pair.kind)
            .await?
            .into_iter()
            .map(|s| (s.collector.name.clone(), s))
            .collect();

        info!(
            pair = %pair_label,
            collectors = collectors.len(),
            with_state = states.len(),
            "Starting sync cycle"
        );

        let until = started + self.policy.forward_margin;
        let units = collectors.iter().map(|collector| {
            let previous = states.get(&collector.name);
            let from = previous.map_or(self.backfill_from, SyncState::watermark);
            let rx = shutdown.clone();
            async move {
                let outcome = self.sync_collector(collector, from, until, started, rx).await;
                (collector, previous, outcome)
            }
        });
        let outcomes = futures::future::join_all(units).await;

        let mut synced = Vec::new();
        let mut new_states = Vec::new();
        for (collector, previous, outcome) in outcomes {
            match outcome {
                Ok(sync) => {
                    report.succeeded.push(collector.name.clone());
                    report.dumps_found += sync.dumps.len();
                    report.dumps_written += sync.written;

                    let base = previous.cloned().unwrap_or_else(|| SyncState {
                        collector: collector.clone(),
                        kind: self.pair.kind,
                        last_completed_crawl: started,
                        latest_dump: None,
                    });
                    new_states.push(SyncState {
                        collector: collector.clone(),
                        ..base.advance(started, &sync.dumps)
                    });
                    synced.push(collector.clone());
                }
                Err(SyncError::Cancelled) => {
                    report.cancelled = true;
                    report.failed.push(collector.name.clone());
                }
                Err(e) => {
                    warn!(
                        pair = %pair_label,
                        collector = %collector.name,
                        error = %e,
                        "Collector sync failed"
                    );
                    report.failed.push(collector.name.clone());
                }
            }
        }

        if !synced.is_empty() {
            self.store.upsert_collectors(&synced, started).await?;
            self.store.upsert_sync_states(&new_states).await?;
        }

        metrics::record_sync_cycle(
            &pair_label,
            report.succeeded.len(),
            report.failed.len(),
            clock.elapsed().as_secs_f64(),
            started.timestamp(),
        );
        info!(
            pair = %pair_label,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            dumps_found = report.dumps_found,
            dumps_written = report.dumps_written,
            "Sync cycle finished"
        );
        Ok(report)
    }

    async fn sync_collector(
        &self,
        collector: &Collector,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        started: DateTime<Utc>,
        mut shutdown: watch::Receiver<bool>,
    ) -> SyncResult<CollectorSync> {
        let pair_label = self.pair.to_string();
        let query = Query::new(from, until)
            .with_collectors(vec![collector.clone()])
            .with_kind(self.pair.kind);

        let finder = self.finder;
        let query = &query;
        let name = collector.name.as_str();
        let retried = with_retry(&self.policy.retry_config(), &mut shutdown, move |attempt| async move {
            debug!(collector = name, attempt, since = %from, "Finding dumps");
            let dumps = finder.find(query).await.map_err(SyncError::from)?;
            if dumps.is_empty() {
                return Err(SyncError::NoDumps {
                    collector: name.to_string(),
                    since: from,
                });
            }
            Ok(dumps)
        })
        .await;

        let dumps = match retried {
            Ok(r) => {
                metrics::record_find_attempts(&pair_label, r.attempts);
                r.value
            }
            Err(RetryError::Exhausted { last, attempts }) => {
                metrics::record_find_attempts(&pair_label, attempts);
                return Err(last);
            }
            Err(RetryError::Cancelled { attempts }) => {
                metrics::record_find_attempts(&pair_label, attempts);
                return Err(SyncError::Cancelled);
            }
        };

        let written = self.store.upsert_bgp_dumps(&dumps, started).await?;
        metrics::record_dumps(&pair_label, dumps.len(), written);
        debug!(
            collector = name,
            found = dumps.len(),
            written,
            "Collector synced"
        );
        Ok(CollectorSync { dumps, written })
    }
}
