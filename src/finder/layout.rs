//! Archive walk shared by every provider
//!
//! Both archives publish `<base>/YYYY.MM/...` trees. A provider describes its
//! own layout through [`ArchiveLayout`]; [`find_dumps`] does the walk:
//! list the collector base, keep month directories overlapping the window,
//! list each month (and its kind sub-directories, if the layout has them),
//! parse filenames and keep what the query accepts.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

use crate::crawler::ListingSource;
use crate::models::{BgpDump, Collector, DumpKind, Project};
use crate::parser::{entry_name, parse_month_dir};
use crate::query::Query;
use crate::utils::error::FinderError;
use crate::utils::join_url;

/// Month directories listed concurrently for one collector
const MONTH_CONCURRENCY: usize = 4;

/// Directory layout and filename grammar of one archive
pub(crate) trait ArchiveLayout: Send + Sync {
    /// Listing URL holding the collector's month directories
    fn base_url(&self, collector: &Collector) -> String;

    /// Kind served by a sub-directory of a month directory, if any
    fn kind_subdir(&self, _name: &str) -> Option<DumpKind> {
        None
    }

    /// Dump kind and embedded timestamp of a filename
    fn parse_file(&self, name: &str) -> Option<(DumpKind, DateTime<Utc>)>;

    /// Nominal duration of a dump of `kind`
    fn duration(&self, kind: DumpKind) -> Duration;
}

// ============================================================================
// Collector cache
// ============================================================================

/// Read-mostly collector set, swapped whole on refresh
#[derive(Debug)]
pub(crate) struct CollectorCache {
    inner: RwLock<Arc<[Collector]>>,
}

impl CollectorCache {
    pub fn new(collectors: Vec<Collector>) -> Self {
        Self {
            inner: RwLock::new(collectors.into()),
        }
    }

    pub fn snapshot(&self) -> Arc<[Collector]> {
        Arc::clone(&self.inner.read().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn replace(&self, collectors: Vec<Collector>) {
        *self.inner.write().unwrap_or_else(|e| e.into_inner()) = collectors.into();
    }

    pub fn get(&self, name: &str) -> Option<Collector> {
        self.snapshot().iter().find(|c| c.name == name).cloned()
    }
}

/// Push `name` unless already present, keeping first-seen order
pub(crate) fn push_unique(collectors: &mut Vec<Collector>, project: &Project, name: &str) {
    if !collectors.iter().any(|c| c.name == name) {
        collectors.push(Collector::new(project, name));
    }
}

// ============================================================================
// Walk
// ============================================================================

/// Collectors a provider should search for `query`
///
/// An empty query set means every cached collector. Otherwise only the
/// collectors owned by this provider are kept, so a provider asked about
/// someone else's collectors searches nothing.
pub(crate) fn resolve_collectors(
    project: &Project,
    cache: &CollectorCache,
    query: &Query,
) -> Vec<Collector> {
    if query.collectors.is_empty() {
        return cache.snapshot().to_vec();
    }

    query
        .collectors
        .iter()
        .filter_map(|c| {
            if c.project == *project {
                Some(c.clone())
            } else if c.project.name.is_empty() {
                cache.get(&c.name)
            } else {
                None
            }
        })
        .collect()
}

/// Find every dump of `collectors` matching `query`
///
/// Collectors are searched concurrently. Failing to list a collector's base
/// directory fails the whole call; a month or kind directory that cannot be
/// listed is logged and skipped.
pub(crate) async fn find_dumps<L: ArchiveLayout>(
    layout: &L,
    listing: &dyn ListingSource,
    collectors: &[Collector],
    query: &Query,
) -> Result<Vec<BgpDump>, FinderError> {
    if query.is_empty_window() || collectors.is_empty() {
        return Ok(Vec::new());
    }

    let per_collector = futures::future::try_join_all(
        collectors
            .iter()
            .map(|collector| find_collector(layout, listing, collector, query)),
    )
    .await?;

    Ok(per_collector.into_iter().flatten().collect())
}

async fn find_collector<L: ArchiveLayout>(
    layout: &L,
    listing: &dyn ListingSource,
    collector: &Collector,
    query: &Query,
) -> Result<Vec<BgpDump>, FinderError> {
    let base = layout.base_url(collector);
    let entries = listing.list(&base).await?;

    let months: Vec<String> = entries
        .iter()
        .filter(|entry| match parse_month_dir(entry) {
            Some(month) => query.wants_month(month),
            None => false,
        })
        .filter_map(|entry| join_url(&base, &as_dir(entry)))
        .collect();

    debug!(
        collector = %collector,
        base = %base,
        entries = entries.len(),
        months = months.len(),
        "Listing collector archive"
    );

    let dumps: Vec<Vec<BgpDump>> = stream::iter(months)
        .map(|month_url| async move {
            find_in_month(layout, listing, collector, query, &month_url).await
        })
        .buffered(MONTH_CONCURRENCY)
        .collect()
        .await;

    let dumps: Vec<BgpDump> = dumps.into_iter().flatten().collect();
    debug!(collector = %collector, dumps = dumps.len(), "Collector search complete");
    Ok(dumps)
}

async fn find_in_month<L: ArchiveLayout>(
    layout: &L,
    listing: &dyn ListingSource,
    collector: &Collector,
    query: &Query,
    month_url: &str,
) -> Vec<BgpDump> {
    let entries = match listing.list(month_url).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(url = %month_url, error = %e, "Skipping unreadable month directory");
            return Vec::new();
        }
    };

    let mut dumps = Vec::new();
    for entry in &entries {
        let name = entry_name(entry);
        match layout.kind_subdir(name) {
            Some(kind) if kind.matches(query.kind) => {
                let Some(dir_url) = join_url(month_url, &as_dir(entry)) else {
                    continue;
                };
                match listing.list(&dir_url).await {
                    Ok(files) => dumps.extend(collect_files(layout, collector, query, &dir_url, &files)),
                    Err(e) => {
                        warn!(url = %dir_url, error = %e, "Skipping unreadable dump directory");
                    }
                }
            }
            Some(_) => {}
            None => dumps.extend(collect_files(
                layout,
                collector,
                query,
                month_url,
                std::slice::from_ref(entry),
            )),
        }
    }
    dumps
}

fn collect_files<L: ArchiveLayout>(
    layout: &L,
    collector: &Collector,
    query: &Query,
    dir_url: &str,
    files: &[String],
) -> Vec<BgpDump> {
    files
        .iter()
        .filter_map(|file| {
            let (kind, ts) = layout.parse_file(entry_name(file))?;
            if !query.accepts(ts, kind) {
                return None;
            }
            Some(BgpDump {
                url: join_url(dir_url, file)?,
                collector: collector.clone(),
                kind,
                duration: layout.duration(kind),
                timestamp: ts.timestamp(),
            })
        })
        .collect()
}

fn as_dir(entry: &str) -> String {
    if entry.ends_with('/') {
        entry.to_string()
    } else {
        format!("{entry}/")
    }
}
