//! RIPE RIS archive provider
//!
//! Layout: `<data>/rrcNN/YYYY.MM/<kind>.YYYYMMDD.HHMM.gz`, files flat in the
//! month directory. RIB snapshots are `bview.` (older archives also carry
//! `view.`), update streams are `updates.`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use super::layout::{find_dumps, push_unique, resolve_collectors, ArchiveLayout, CollectorCache};
use super::Finder;
use crate::crawler::ListingSource;
use crate::models::{BgpDump, Collector, DumpKind, Project};
use crate::parser::parse_file_timestamp;
use crate::query::Query;
use crate::utils::error::FinderError;

pub const RIS: &str = "ris";

/// Lists every collector, including retired ones
pub const RIS_COLLECTORS_URL: &str = "https://ris.ripe.net/docs/route-collectors/";
pub const RIS_DATA_URL: &str = "https://data.ris.ripe.net/";

const RIB_DURATION: Duration = Duration::from_secs(8 * 60 * 60);
const UPDATES_DURATION: Duration = Duration::from_secs(5 * 60);

static COLLECTOR_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"rrc\d\d").ok());

static FILE_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(bview|view|updates)\.(\d{8})\.(\d{4})\.gz$").ok());

/// Finder for the RIPE RIS archive
pub struct RisFinder {
    project: Project,
    collectors_url: String,
    data_url: String,
    listing: Arc<dyn ListingSource>,
    collectors: CollectorCache,
}

impl RisFinder {
    /// Scrape the collector list from the RIS documentation site
    pub async fn new(listing: Arc<dyn ListingSource>) -> Result<Self, FinderError> {
        Self::with_urls(listing, RIS_COLLECTORS_URL, RIS_DATA_URL).await
    }

    pub async fn with_urls(
        listing: Arc<dyn ListingSource>,
        collectors_url: &str,
        data_url: &str,
    ) -> Result<Self, FinderError> {
        let data_url = if data_url.ends_with('/') {
            data_url.to_string()
        } else {
            format!("{data_url}/")
        };
        let finder = Self {
            project: Project::new(RIS),
            collectors_url: collectors_url.to_string(),
            data_url,
            listing,
            collectors: CollectorCache::new(Vec::new()),
        };
        let collectors = finder.scrape_collectors().await?;
        tracing::info!(project = RIS, collectors = collectors.len(), "Collector list loaded");
        finder.collectors.replace(collectors);
        Ok(finder)
    }

    async fn scrape_collectors(&self) -> Result<Vec<Collector>, FinderError> {
        let links = self
            .listing
            .list(&self.collectors_url)
            .await
            .map_err(|source| FinderError::CollectorList {
                project: RIS.to_string(),
                source,
            })?;

        let mut collectors = Vec::new();
        if let Some(pattern) = COLLECTOR_PATTERN.as_ref() {
            for link in &links {
                if let Some(m) = pattern.find(link) {
                    push_unique(&mut collectors, &self.project, m.as_str());
                }
            }
        }
        Ok(collectors)
    }
}

impl ArchiveLayout for RisFinder {
    fn base_url(&self, collector: &Collector) -> String {
        format!("{}{}/", self.data_url, collector.name)
    }

    fn parse_file(&self, name: &str) -> Option<(DumpKind, DateTime<Utc>)> {
        let caps = FILE_PATTERN.as_ref()?.captures(name)?;
        let kind = match &caps[1] {
            "updates" => DumpKind::Updates,
            _ => DumpKind::Rib,
        };
        Some((kind, parse_file_timestamp(&caps[2], &caps[3])?))
    }

    fn duration(&self, kind: DumpKind) -> Duration {
        match kind {
            DumpKind::Rib => RIB_DURATION,
            _ => UPDATES_DURATION,
        }
    }
}

#[async_trait]
impl Finder for RisFinder {
    fn projects(&self) -> Vec<Project> {
        vec![self.project.clone()]
    }

    fn project(&self, name: &str) -> Option<Project> {
        (name.is_empty() || name == RIS).then(|| self.project.clone())
    }

    fn collectors(&self, project: &str) -> Vec<Collector> {
        if !project.is_empty() && project != RIS {
            return Vec::new();
        }
        self.collectors.snapshot().to_vec()
    }

    fn collector(&self, name: &str) -> Option<Collector> {
        self.collectors.get(name)
    }

    async fn find(&self, query: &Query) -> Result<Vec<BgpDump>, FinderError> {
        let collectors = resolve_collectors(&self.project, &self.collectors, query);
        find_dumps(self, self.listing.as_ref(), &collectors, query).await
    }

    async fn refresh_collectors(&self) -> Result<usize, FinderError> {
        let collectors = self.scrape_collectors().await?;
        let count = collectors.len();
        self.collectors.replace(collectors);
        Ok(count)
    }
}
