//! Common test utilities

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use bgpfinder::finder::Finder;
use bgpfinder::models::{BgpDump, Collector, DumpKind, Project};
use bgpfinder::query::Query;
use bgpfinder::utils::error::{FetchError, FinderError};

pub fn ris() -> Project {
    Project::new("ris")
}

pub fn routeviews() -> Project {
    Project::new("routeviews")
}

pub fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

/// RIS dump with the archive's naming scheme
pub fn ris_dump(collector: &str, kind: DumpKind, at: DateTime<Utc>) -> BgpDump {
    let (prefix, duration) = match kind {
        DumpKind::Rib => ("bview", Duration::from_secs(8 * 3600)),
        _ => ("updates", Duration::from_secs(300)),
    };
    BgpDump {
        url: format!(
            "https://data.ris.ripe.net/{collector}/{}/{prefix}.{}.gz",
            at.format("%Y.%m"),
            at.format("%Y%m%d.%H%M")
        ),
        collector: Collector::new(&ris(), collector),
        kind,
        duration,
        timestamp: at.timestamp(),
    }
}

/// Finder over a fixed set of RIS collectors with scripted answers
///
/// Each collector serves the dumps registered for it, filtered by the query.
/// A collector can be told to fail its next N finds, or every find.
#[derive(Default)]
pub struct ScriptedFinder {
    collectors: Vec<Collector>,
    dumps: Mutex<HashMap<String, Vec<BgpDump>>>,
    failures: Mutex<HashMap<String, u32>>,
    calls: Mutex<Vec<(String, tokio::time::Instant, Query)>>,
}

impl ScriptedFinder {
    pub fn new(names: &[&str]) -> Self {
        Self {
            collectors: names.iter().map(|n| Collector::new(&ris(), *n)).collect(),
            ..Default::default()
        }
    }

    pub fn serve(&self, collector: &str, dumps: Vec<BgpDump>) {
        self.dumps
            .lock()
            .unwrap()
            .entry(collector.to_string())
            .or_default()
            .extend(dumps);
    }

    /// Fail the next `times` finds touching `collector`
    pub fn fail(&self, collector: &str, times: u32) {
        self.failures
            .lock()
            .unwrap()
            .insert(collector.to_string(), times);
    }

    pub fn fail_always(&self, collector: &str) {
        self.fail(collector, u32::MAX);
    }

    /// Instants of every find touching `collector`
    pub fn call_times(&self, collector: &str) -> Vec<tokio::time::Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _, _)| name == collector)
            .map(|(_, at, _)| *at)
            .collect()
    }

    /// Queries issued for `collector`
    pub fn queries(&self, collector: &str) -> Vec<Query> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _, _)| name == collector)
            .map(|(_, _, q)| q.clone())
            .collect()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Finder for ScriptedFinder {
    fn projects(&self) -> Vec<Project> {
        vec![ris()]
    }

    fn project(&self, name: &str) -> Option<Project> {
        (name.is_empty() || name == "ris").then(ris)
    }

    fn collectors(&self, project: &str) -> Vec<Collector> {
        if project.is_empty() || project == "ris" {
            self.collectors.clone()
        } else {
            Vec::new()
        }
    }

    fn collector(&self, name: &str) -> Option<Collector> {
        self.collectors.iter().find(|c| c.name == name).cloned()
    }

    async fn find(&self, query: &Query) -> Result<Vec<BgpDump>, FinderError> {
        let targets = if query.collectors.is_empty() {
            self.collectors.clone()
        } else {
            query.collectors.clone()
        };

        let mut found = Vec::new();
        for collector in &targets {
            self.calls.lock().unwrap().push((
                collector.name.clone(),
                tokio::time::Instant::now(),
                query.clone(),
            ));

            {
                let mut failures = self.failures.lock().unwrap();
                if let Some(left) = failures.get_mut(&collector.name) {
                    if *left > 0 {
                        if *left != u32::MAX {
                            *left -= 1;
                        }
                        return Err(FinderError::RemoteFetch(FetchError::Status {
                            url: format!("https://data.ris.ripe.net/{}/", collector.name),
                            status: 503,
                        }));
                    }
                }
            }

            if let Some(dumps) = self.dumps.lock().unwrap().get(&collector.name) {
                found.extend(
                    dumps
                        .iter()
                        .filter(|d| query.accepts(d.time(), d.kind))
                        .cloned(),
                );
            }
        }
        Ok(found)
    }

    async fn refresh_collectors(&self) -> Result<usize, FinderError> {
        Ok(self.collectors.len())
    }
}
