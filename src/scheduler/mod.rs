//! Background synchronization of the cache store
//!
//! The scheduler keeps the cache store current by running one loop per
//! (project, dump kind) pair. Each loop sleeps until its next epoch-aligned
//! boundary, then runs a [`Cycle`] that searches every collector of the
//! project from its watermark forward.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                        SyncScheduler                          │
//! │  ┌──────────────┐ ┌──────────────┐ ┌──────────┐ ┌──────────┐  │
//! │  │ routeviews/  │ │ routeviews/  │ │  ris/    │ │  ris/    │  │
//! │  │ rib (2h)     │ │ updates(15m) │ │ rib (8h) │ │ upd (5m) │  │
//! │  └──────┬───────┘ └──────┬───────┘ └────┬─────┘ └────┬─────┘  │
//! │         └────────────────┴──────┬───────┴────────────┘        │
//! └─────────────────────────────────┼─────────────────────────────┘
//!                                   │
//!                    ┌──────────────┴──────────────┐
//!                    ▼                             ▼
//!              ┌──────────┐                 ┌─────────────┐
//!              │  Finder  │                 │  DumpStore  │
//!              └──────────┘                 └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`policy`] - Pairs and their intervals and backoff
//! - [`cadence`] - Epoch-aligned wake-up computation
//! - [`cycle`] - One cycle across all collectors of a pair
//! - [`error`] - Scheduler errors
//!
//! # Cancellation
//!
//! A `tokio::sync::watch::Receiver<bool>` flips to `true` on shutdown. It is
//! observed while waiting for the next boundary, during backoff sleeps and
//! around every find.

pub mod cadence;
pub mod cycle;
pub mod error;
pub mod policy;

pub use cadence::next_aligned_instant;
pub use cycle::{Cycle, CycleReport};
pub use error::{SyncError, SyncResult};
pub use policy::{SyncPair, SyncPolicy};

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::finder::Finder;
use crate::storage::DumpStore;
use crate::utils::parse_time;
use crate::utils::retry::{is_shutdown, sleep_or_shutdown};

/// Runs the per-pair synchronization loops
pub struct SyncScheduler {
    finder: Arc<dyn Finder>,
    store: Arc<dyn DumpStore>,
    policies: Vec<(SyncPair, SyncPolicy)>,
    starts: HashMap<SyncPair, DateTime<Utc>>,
    backfill_from: DateTime<Utc>,
}

impl SyncScheduler {
    /// Scheduler for every pair with its default policy, backfilling from the epoch
    pub fn new(finder: Arc<dyn Finder>, store: Arc<dyn DumpStore>) -> Self {
        Self {
            finder,
            store,
            policies: SyncPair::ALL.iter().map(|p| (*p, p.policy())).collect(),
            starts: HashMap::new(),
            backfill_from: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    pub fn with_backfill_from(mut self, from: DateTime<Utc>) -> Self {
        self.backfill_from = from;
        self
    }

    /// Replace the policy of `pair`, adding the pair if it was not scheduled
    pub fn with_policy(mut self, pair: SyncPair, policy: SyncPolicy) -> Self {
        match self.policies.iter_mut().find(|(p, _)| *p == pair) {
            Some(entry) => entry.1 = policy,
            None => self.policies.push((pair, policy)),
        }
        self
    }

    /// Restrict the scheduler to `pairs`
    pub fn with_pairs(mut self, pairs: &[SyncPair]) -> Self {
        self.policies.retain(|(p, _)| pairs.contains(p));
        self
    }

    /// Run the first cycle of `pair` at `at` instead of the next boundary
    pub fn with_start(mut self, pair: SyncPair, at: DateTime<Utc>) -> Self {
        self.starts.insert(pair, at);
        self
    }

    /// Apply `PAIR=TIME` start arguments, e.g. `ris/rib=2024-01-01T00:00:00Z`
    pub fn with_start_args(mut self, args: &[String]) -> SyncResult<Self> {
        for arg in args {
            let (pair, time) = arg
                .split_once('=')
                .ok_or_else(|| SyncError::invalid_start(arg, "expected PAIR=TIME"))?;
            let pair: SyncPair = pair
                .parse()
                .map_err(|e: String| SyncError::invalid_start(arg, e))?;
            let at = parse_time(time).map_err(|e| SyncError::invalid_start(arg, e.to_string()))?;
            self = self.with_start(pair, at);
        }
        Ok(self)
    }

    pub fn pairs(&self) -> Vec<SyncPair> {
        self.policies.iter().map(|(p, _)| *p).collect()
    }

    fn policy(&self, pair: SyncPair) -> SyncPolicy {
        self.policies
            .iter()
            .find(|(p, _)| *p == pair)
            .map_or_else(|| pair.policy(), |(_, policy)| policy.clone())
    }

    /// Run one cycle of `pair` now
    pub async fn run_once(
        &self,
        pair: SyncPair,
        shutdown: &watch::Receiver<bool>,
    ) -> SyncResult<CycleReport> {
        let policy = self.policy(pair);
        let cycle = Cycle {
            finder: self.finder.as_ref(),
            store: self.store.as_ref(),
            pair,
            policy: &policy,
            backfill_from: self.backfill_from,
        };
        cycle.run(Utc::now(), shutdown).await
    }

    /// Run every pair's loop until shutdown
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        info!(pairs = self.policies.len(), "Sync scheduler started");
        let loops = self
            .policies
            .iter()
            .map(|(pair, policy)| self.pair_loop(*pair, policy, shutdown.clone()));
        futures::future::join_all(loops).await;
        info!("Sync scheduler stopped");
    }

    async fn pair_loop(
        &self,
        pair: SyncPair,
        policy: &SyncPolicy,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut first_start = self.starts.get(&pair).copied();
        let mut last_wake: Option<DateTime<Utc>> = None;

        loop {
            let now = Utc::now();
            let wake = match (first_start.take(), last_wake) {
                (Some(at), _) => at,
                (None, Some(previous)) => {
                    let (wake, skipped) = cadence::following_wake(
                        previous,
                        now,
                        policy.interval,
                        policy.alignment_buffer,
                    );
                    if skipped {
                        warn!(
                            pair = %pair,
                            previous_run = %previous,
                            next_run = %wake,
                            "Sync cycle overran its interval, skipping missed boundary"
                        );
                    }
                    wake
                }
                (None, None) => {
                    next_aligned_instant(now, policy.interval, policy.alignment_buffer)
                }
            };
            info!(pair = %pair, next_run = %wake, "Waiting for next sync cycle");
            if sleep_or_shutdown(cadence::until(now, wake), &mut shutdown).await {
                break;
            }
            last_wake = Some(wake);

            let cycle = Cycle {
                finder: self.finder.as_ref(),
                store: self.store.as_ref(),
                pair,
                policy,
                backfill_from: self.backfill_from,
            };
            match cycle.run(Utc::now(), &shutdown).await {
                Ok(report) if report.cancelled => break,
                Ok(_) => {}
                Err(e) => error!(pair = %pair, error = %e, "Sync cycle failed"),
            }

            if is_shutdown(&shutdown) {
                break;
            }
        }
        info!(pair = %pair, "Sync loop stopped");
    }
}
