//! Cache store
//!
//! The store is both the first-look read path of the REST front end and the
//! sink of the synchronization scheduler. [`DumpStore`] abstracts it so the
//! scheduler and the server can run against [`PostgresStore`] in production
//! and [`MemoryStore`] in tests and dry runs.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐   ┌──────────────────────┐
//! │  SyncScheduler       │   │  REST /data          │
//! └──────────┬───────────┘   └──────────┬───────────┘
//!            └────────────┬─────────────┘
//!                         ▼
//!               ┌───────────────────┐
//!               │  DumpStore trait  │
//!               └─────────┬─────────┘
//!             ┌───────────┴───────────┐
//!             ▼                       ▼
//!   ┌──────────────────┐    ┌──────────────────┐
//!   │  PostgresStore   │    │   MemoryStore    │
//!   └──────────────────┘    └──────────────────┘
//! ```

pub mod postgres;

pub use postgres::PostgresStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::models::{BgpDump, Collector, DumpKind, Project, SyncState};
use crate::query::Query;
use crate::utils::error::StoreError;

/// Rows written per transaction by [`DumpStore::upsert_bgp_dumps`]
pub const UPSERT_CHUNK_SIZE: usize = 10_000;

/// Persistence for collectors, dumps and synchronization watermarks
#[async_trait]
pub trait DumpStore: Send + Sync {
    /// Merge collectors keyed by name, all in one transaction
    async fn upsert_collectors(
        &self,
        collectors: &[Collector],
        as_of: DateTime<Utc>,
    ) -> Result<usize, StoreError>;

    /// Merge dumps keyed by (collector, url)
    ///
    /// Rows are written in chunks of [`UPSERT_CHUNK_SIZE`], each committed on
    /// its own; a failure leaves earlier chunks in place. An existing row keeps
    /// its first-fetch time. Returns the number of rows written.
    async fn upsert_bgp_dumps(
        &self,
        dumps: &[BgpDump],
        as_of: DateTime<Utc>,
    ) -> Result<usize, StoreError>;

    /// Stored dumps matching `query`, ordered by timestamp then URL
    ///
    /// No match is an empty list, not an error.
    async fn fetch_by_query(&self, query: &Query) -> Result<Vec<BgpDump>, StoreError>;

    /// Watermarks of every collector of `project` for `kind`
    async fn sync_states(
        &self,
        project: &Project,
        kind: DumpKind,
    ) -> Result<Vec<SyncState>, StoreError>;

    /// Merge watermarks in one transaction; the newest dump timestamp never moves back
    async fn upsert_sync_states(&self, states: &[SyncState]) -> Result<usize, StoreError>;
}

// ============================================================================
// In-memory implementation
// ============================================================================

#[derive(Debug, Clone)]
struct StoredDump {
    dump: BgpDump,
    first_fetch: DateTime<Utc>,
    last_fetch: DateTime<Utc>,
}

#[derive(Default)]
struct MemoryInner {
    collectors: HashMap<String, (Project, DateTime<Utc>)>,
    dumps: BTreeMap<(String, String), StoredDump>,
    states: HashMap<(String, DumpKind), SyncState>,
    unavailable: bool,
    failing_chunk: Option<usize>,
}

/// In-memory store with the same key semantics as the PostgreSQL schema
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check(inner: &MemoryInner) -> Result<(), StoreError> {
        if inner.unavailable {
            Err(StoreError::Pool("memory store marked unavailable".to_string()))
        } else {
            Ok(())
        }
    }

    /// Make every operation fail until reset
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Make the dump upsert chunk at `index` (zero-based) fail
    pub fn fail_dump_chunk(&self, index: Option<usize>) {
        self.lock().failing_chunk = index;
    }

    /// Number of stored dumps
    pub fn dump_count(&self) -> usize {
        self.lock().dumps.len()
    }

    /// First and last fetch instants of a stored dump
    pub fn fetch_times(&self, collector: &str, url: &str) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.lock()
            .dumps
            .get(&(collector.to_string(), url.to_string()))
            .map(|s| (s.first_fetch, s.last_fetch))
    }

    /// Last fetch instant recorded for a collector
    pub fn collector_seen(&self, name: &str) -> Option<DateTime<Utc>> {
        self.lock().collectors.get(name).map(|(_, at)| *at)
    }

    /// Stored watermark for one collector and kind
    pub fn sync_state(&self, collector: &str, kind: DumpKind) -> Option<SyncState> {
        self.lock().states.get(&(collector.to_string(), kind)).cloned()
    }
}

#[async_trait]
impl DumpStore for MemoryStore {
    async fn upsert_collectors(
        &self,
        collectors: &[Collector],
        as_of: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut inner = self.lock();
        Self::check(&inner)?;
        for c in collectors {
            inner
                .collectors
                .insert(c.name.clone(), (c.project.clone(), as_of));
        }
        Ok(collectors.len())
    }

    async fn upsert_bgp_dumps(
        &self,
        dumps: &[BgpDump],
        as_of: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut inner = self.lock();
        Self::check(&inner)?;
        let mut written = 0usize;
        for (index, chunk) in dumps.chunks(UPSERT_CHUNK_SIZE).enumerate() {
            if inner.failing_chunk == Some(index) {
                return Err(StoreError::Pool(format!(
                    "memory store rejected chunk {index} after {written} rows"
                )));
            }
            for dump in chunk {
                let key = (dump.collector.name.clone(), dump.url.clone());
                let first_fetch = inner.dumps.get(&key).map_or(as_of, |s| s.first_fetch);
                inner.dumps.insert(
                    key,
                    StoredDump {
                        dump: dump.clone(),
                        first_fetch,
                        last_fetch: as_of,
                    },
                );
            }
            written += chunk.len();
        }
        Ok(written)
    }

    async fn fetch_by_query(&self, query: &Query) -> Result<Vec<BgpDump>, StoreError> {
        let inner = self.lock();
        Self::check(&inner)?;
        if query.is_empty_window() {
            return Ok(Vec::new());
        }

        let mut found: Vec<BgpDump> = inner
            .dumps
            .values()
            .map(|s| &s.dump)
            .filter(|d| {
                query.collectors.is_empty()
                    || query.collectors.iter().any(|c| c.name == d.collector.name)
            })
            .filter(|d| query.accepts(d.time(), d.kind))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.url.cmp(&b.url)));
        Ok(found)
    }

    async fn sync_states(
        &self,
        project: &Project,
        kind: DumpKind,
    ) -> Result<Vec<SyncState>, StoreError> {
        let inner = self.lock();
        Self::check(&inner)?;
        Ok(inner
            .states
            .values()
            .filter(|s| s.kind == kind && s.collector.project == *project)
            .cloned()
            .collect())
    }

    async fn upsert_sync_states(&self, states: &[SyncState]) -> Result<usize, StoreError> {
        let mut inner = self.lock();
        Self::check(&inner)?;
        for state in states {
            let key = (state.collector.name.clone(), state.kind);
            let latest_dump = match inner.states.get(&key).and_then(|s| s.latest_dump) {
                Some(prev) => Some(state.latest_dump.map_or(prev, |new| new.max(prev))),
                None => state.latest_dump,
            };
            inner.states.insert(
                key,
                SyncState {
                    latest_dump,
                    ..state.clone()
                },
            );
        }
        Ok(states.len())
    }
}
