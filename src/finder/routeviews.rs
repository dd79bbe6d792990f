//! RouteViews archive provider
//!
//! Layout: `<root>[<collector>/]bgpdata/YYYY.MM/{RIBS,UPDATES}/<kind>.YYYYMMDD.HHMM.bz2`.
//! `route-views2` is the historical collector published at `<root>bgpdata/`.

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

pub const ROUTEVIEWS: &str = "routeviews";
pub const ROUTEVIEWS_ARCHIVE_URL: &str = "https://archive.routeviews.org/";

/// Collector served from the archive root rather than its own directory
const LEGACY_COLLECTOR: &str = "route-views2";

const RIB_DURATION: Duration = Duration::from_secs(2 * 60 * 60);
const UPDATES_DURATION: Duration = Duration::from_secs(15 * 60);

static FILE_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(rib|updates)\.(\d{8})\.(\d{4})\.bz2$").ok());

/// Finder for the RouteViews archive
pub struct RouteViewsFinder {
    project: Project,
    archive_url: String,
    listing: Arc<dyn ListingSource>,
    collectors: CollectorCache,
}

impl RouteViewsFinder {
    /// Scrape the collector list from the public archive
    pub async fn new(listing: Arc<dyn ListingSource>) -> Result<Self, FinderError> {
        Self::with_archive_url(listing, ROUTEVIEWS_ARCHIVE_URL).await
    }

    /// Scrape the collector list from an archive mirror at `archive_url`
    pub async fn with_archive_url(
        listing: Arc<dyn ListingSource>,
        archive_url: &str,
    ) -> Result<Self, FinderError> {
        let finder = Self {
            project: Project::new(ROUTEVIEWS),
            archive_url: with_trailing_slash(archive_url),
            listing,
            collectors: CollectorCache::new(Vec::new()),
        };
        let collectors = finder.scrape_collectors().await?;
        tracing::info!(
            project = ROUTEVIEWS,
            collectors = collectors.len(),
            "Collector list loaded"
        );
        finder.collectors.replace(collectors);
        Ok(finder)
    }

    async fn scrape_collectors(&self) -> Result<Vec<Collector>, FinderError> {
        let links = self
            .listing
            .list(&self.archive_url)
            .await
            .map_err(|source| FinderError::CollectorList {
                project: ROUTEVIEWS.to_string(),
                source,
            })?;

        let mut collectors = Vec::new();
        for link in &links {
            if let Some(name) = self.collector_name(link) {
                push_unique(&mut collectors, &self.project, &name);
            }
        }
        Ok(collectors)
    }

    /// Collector name for a root listing link ending in `/bgpdata`
    fn collector_name(&self, link: &str) -> Option<String> {
        let path = link
            .strip_prefix(self.archive_url.as_str())
            .unwrap_or(link)
            .trim_end_matches('/');
        let prefix = path.strip_suffix("bgpdata")?;
        if !(prefix.is_empty() || prefix.ends_with('/')) {
            return None;
        }
        let name = prefix.trim_matches('/');
        if name.contains('/') {
            return None;
        }
        Some(if name.is_empty() {
            LEGACY_COLLECTOR.to_string()
        } else {
            name.to_string()
        })
    }
}

fn with_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}

impl ArchiveLayout for RouteViewsFinder {
    fn base_url(&self, collector: &Collector) -> String {
        if collector.name == LEGACY_COLLECTOR {
            format!("{}bgpdata/", self.archive_url)
        } else {
            format!("{}{}/bgpdata/", self.archive_url, collector.name)
        }
    }

    fn kind_subdir(&self, name: &str) -> Option<DumpKind> {
        match name {
            "RIBS" => Some(DumpKind::Rib),
            "UPDATES" => Some(DumpKind::Updates),
            _ => None,
        }
    }

    fn parse_file(&self, name: &str) -> Option<(DumpKind, DateTime<Utc>)> {
        let caps = FILE_PATTERN.as_ref()?.captures(name)?;
        let kind = match &caps[1] {
            "rib" => DumpKind::Rib,
            _ => DumpKind::Updates,
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
impl Finder for RouteViewsFinder {
    fn projects(&self) -> Vec<Project> {
        vec![self.project.clone()]
    }

    fn project(&self, name: &str) -> Option<Project> {
        (name.is_empty() || name == ROUTEVIEWS).then(|| self.project.clone())
    }

    fn collectors(&self, project: &str) -> Vec<Collector> {
        if !project.is_empty() && project != ROUTEVIEWS {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::MockListing;
    use chrono::TimeZone;

    const ROOT: &str = "https://archive.routeviews.org/";

    fn root_listing(mock: &MockListing) {
        mock.insert(
            ROOT,
            [
                "/bgpdata",
                "/route-views3/bgpdata",
                "route-views.linx/bgpdata/",
                "/route-views3/bgpdata",
                "/route-views3/",
                "/otherdata",
                "README",
            ],
        );
    }

    async fn finder(mock: Arc<MockListing>) -> RouteViewsFinder {
        RouteViewsFinder::new(mock).await.unwrap()
    }

    #[tokio::test]
    async fn test_collectors_from_root_listing() {
        let mock = Arc::new(MockListing::new());
        root_listing(&mock);
        let finder = finder(mock).await;

        let names: Vec<String> = finder.collectors("").into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["route-views2", "route-views3", "route-views.linx"]);
        assert!(finder.collectors("ris").is_empty());
        assert_eq!(finder.collectors(ROUTEVIEWS).len(), 3);
    }

    #[tokio::test]
    async fn test_project_lookup() {
        let mock = Arc::new(MockListing::new());
        root_listing(&mock);
        let finder = finder(mock).await;

        assert_eq!(finder.projects(), vec![Project::new(ROUTEVIEWS)]);
        assert_eq!(finder.project(""), Some(Project::new(ROUTEVIEWS)));
        assert_eq!(finder.project(ROUTEVIEWS), Some(Project::new(ROUTEVIEWS)));
        assert_eq!(finder.project("ris"), None);
    }

    #[tokio::test]
    async fn test_unknown_collector_is_none() {
        let mock = Arc::new(MockListing::new());
        root_listing(&mock);
        let finder = finder(mock).await;
        assert!(finder.collector("route-views3").is_some());
        assert!(finder.collector("rrc00").is_none());
    }

    #[tokio::test]
    async fn test_base_urls() {
        let mock = Arc::new(MockListing::new());
        root_listing(&mock);
        let finder = finder(mock).await;
        let project = Project::new(ROUTEVIEWS);

        assert_eq!(
            finder.base_url(&Collector::new(&project, "route-views2")),
            "https://archive.routeviews.org/bgpdata/"
        );
        assert_eq!(
            finder.base_url(&Collector::new(&project, "route-views3")),
            "https://archive.routeviews.org/route-views3/bgpdata/"
        );
    }

    #[tokio::test]
    async fn test_filename_grammar() {
        let mock = Arc::new(MockListing::new());
        root_listing(&mock);
        let finder = finder(mock).await;

        let (kind, ts) = finder.parse_file("rib.20210115.0000.bz2").unwrap();
        assert_eq!(kind, DumpKind::Rib);
        assert_eq!(ts, Utc.with_ymd_and_hms(2021, 1, 15, 0, 0, 0).unwrap());

        let (kind, _) = finder.parse_file("updates.20210115.0015.bz2").unwrap();
        assert_eq!(kind, DumpKind::Updates);

        assert!(finder.parse_file("rib.20210115.0000.gz").is_none());
        assert!(finder.parse_file("bview.20210115.0000.bz2").is_none());
        assert!(finder.parse_file("rib.2021011.0000.bz2").is_none());
        assert_eq!(finder.duration(DumpKind::Rib), Duration::from_secs(7200));
        assert_eq!(finder.duration(DumpKind::Updates), Duration::from_secs(900));
    }

    #[tokio::test]
    async fn test_find_lists_only_wanted_kind_dirs() {
        let mock = Arc::new(MockListing::new());
        root_listing(&mock);
        let base = "https://archive.routeviews.org/route-views3/bgpdata/";
        mock.insert(base, ["2021.01/", "2021.02/"]);
        mock.insert(&format!("{base}2021.01/"), ["RIBS/", "UPDATES/"]);
        mock.insert(
            &format!("{base}2021.01/RIBS/"),
            ["rib.20210115.0000.bz2", "rib.20210121.0000.bz2"],
        );
        mock.insert(&format!("{base}2021.01/UPDATES/"), ["updates.20210115.0015.bz2"]);
        let finder = finder(Arc::clone(&mock)).await;

        let collector = finder.collector("route-views3").unwrap();
        let query = Query::new(
            Utc.with_ymd_and_hms(2021, 1, 10, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2021, 1, 20, 0, 0, 0).unwrap(),
        )
        .with_collectors(vec![collector])
        .with_kind(DumpKind::Rib);

        let dumps = finder.find(&query).await.unwrap();
        assert_eq!(dumps.len(), 1);
        assert_eq!(
            dumps[0].url,
            "https://archive.routeviews.org/route-views3/bgpdata/2021.01/RIBS/rib.20210115.0000.bz2"
        );
        assert_eq!(dumps[0].duration, RIB_DURATION);
        assert_eq!(mock.calls(&format!("{base}2021.01/UPDATES/")), 0);
        assert_eq!(mock.calls(&format!("{base}2021.02/")), 0);
    }

    #[tokio::test]
    async fn test_refresh_keeps_old_set_on_failure() {
        let mock = Arc::new(MockListing::new());
        root_listing(&mock);
        let finder = finder(Arc::clone(&mock)).await;

        mock.insert_status(ROOT, 503);
        let err = finder.refresh_collectors().await.unwrap_err();
        assert!(matches!(err, FinderError::CollectorList { .. }));
        assert_eq!(finder.collectors("").len(), 3);

        mock.insert(ROOT, ["/route-views4/bgpdata"]);
        assert_eq!(finder.refresh_collectors().await.unwrap(), 1);
        assert_eq!(finder.collectors("")[0].name, "route-views4");
    }

    #[tokio::test]
    async fn test_constructor_fails_without_collector_list() {
        let mock = Arc::new(MockListing::new());
        mock.insert_status(ROOT, 500);
        let err = RouteViewsFinder::new(mock).await.err().unwrap();
        assert!(matches!(err, FinderError::CollectorList { .. }));
    }
}
