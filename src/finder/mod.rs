//! Dump discovery
//!
//! Every archive provider implements [`Finder`]. Providers differ only in how
//! their archives are laid out; the walk itself lives in `layout` so all of
//! them filter with the same window semantics.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use bgpfinder::crawler::HttpListing;
//! use bgpfinder::finder::{Finder, MultiFinder};
//!
//! let listing = Arc::new(HttpListing::new()?);
//! let finder = MultiFinder::from_archives(listing, &Default::default()).await?;
//! let dumps = finder.find(&query).await?;
//! ```

mod layout;
pub mod ris;
pub mod routeviews;

pub use ris::RisFinder;
pub use routeviews::RouteViewsFinder;

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::ArchiveConfig;
use crate::crawler::ListingSource;
use crate::models::{BgpDump, Collector, Project};
use crate::query::Query;
use crate::utils::error::FinderError;

/// Discovery contract shared by every provider
#[async_trait]
pub trait Finder: Send + Sync {
    /// Projects served by this finder
    fn projects(&self) -> Vec<Project>;

    /// Project called `name`; `""` means the finder's own project
    fn project(&self, name: &str) -> Option<Project>;

    /// Cached collectors, filtered by project name (`""` for all)
    ///
    /// A project this finder does not serve yields an empty list.
    fn collectors(&self, project: &str) -> Vec<Collector>;

    /// Collector called `name`
    fn collector(&self, name: &str) -> Option<Collector>;

    /// Dumps matching `query`
    ///
    /// # Errors
    ///
    /// `FinderError::RemoteFetch` if a collector's archive root cannot be
    /// listed. Unreadable month directories are skipped.
    async fn find(&self, query: &Query) -> Result<Vec<BgpDump>, FinderError>;

    /// Re-scrape the collector list and swap it in
    ///
    /// On failure the previous list stays in place. Returns the new count.
    async fn refresh_collectors(&self) -> Result<usize, FinderError>;
}

// ============================================================================
// Provider selection
// ============================================================================

/// Supported archive providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    RouteViews,
    Ris,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::RouteViews, Provider::Ris];

    /// Project name of the provider
    pub fn name(&self) -> &'static str {
        match self {
            Self::RouteViews => routeviews::ROUTEVIEWS,
            Self::Ris => ris::RIS,
        }
    }

    /// Build the provider's finder, scraping its collector list
    pub async fn build(
        self,
        listing: Arc<dyn ListingSource>,
        archives: &ArchiveConfig,
    ) -> Result<Arc<dyn Finder>, FinderError> {
        let finder: Arc<dyn Finder> = match self {
            Self::RouteViews => Arc::new(
                RouteViewsFinder::with_archive_url(listing, &archives.routeviews_url).await?,
            ),
            Self::Ris => Arc::new(
                RisFinder::with_urls(listing, &archives.ris_collectors_url, &archives.ris_data_url)
                    .await?,
            ),
        };
        Ok(finder)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "routeviews" | "rv" => Ok(Self::RouteViews),
            "ris" => Ok(Self::Ris),
            other => Err(format!("unknown project '{other}' (expected routeviews or ris)")),
        }
    }
}

// ============================================================================
// Multi-provider finder
// ============================================================================

/// Aggregates several providers behind the [`Finder`] contract
pub struct MultiFinder {
    finders: Vec<Arc<dyn Finder>>,
}

impl MultiFinder {
    pub fn new(finders: Vec<Arc<dyn Finder>>) -> Self {
        Self { finders }
    }

    /// Build every supported provider concurrently
    pub async fn from_archives(
        listing: Arc<dyn ListingSource>,
        archives: &ArchiveConfig,
    ) -> Result<Self, FinderError> {
        let finders = futures::future::try_join_all(
            Provider::ALL
                .into_iter()
                .map(|p| p.build(Arc::clone(&listing), archives)),
        )
        .await?;
        Ok(Self::new(finders))
    }

    /// Finder owning `collector`
    fn owner(&self, collector: &Collector) -> Option<usize> {
        self.finders.iter().position(|f| {
            if collector.project.name.is_empty() {
                f.collector(&collector.name).is_some()
            } else {
                f.project(&collector.project.name).is_some()
            }
        })
    }
}

#[async_trait]
impl Finder for MultiFinder {
    fn projects(&self) -> Vec<Project> {
        self.finders.iter().flat_map(|f| f.projects()).collect()
    }

    fn project(&self, name: &str) -> Option<Project> {
        if name.is_empty() {
            return None;
        }
        self.finders.iter().find_map(|f| f.project(name))
    }

    fn collectors(&self, project: &str) -> Vec<Collector> {
        self.finders.iter().flat_map(|f| f.collectors(project)).collect()
    }

    fn collector(&self, name: &str) -> Option<Collector> {
        self.finders.iter().find_map(|f| f.collector(name))
    }

    async fn find(&self, query: &Query) -> Result<Vec<BgpDump>, FinderError> {
        if query.is_empty_window() {
            return Ok(Vec::new());
        }

        let mut partitions: Vec<Vec<Collector>> = vec![Vec::new(); self.finders.len()];
        for collector in &query.collectors {
            let idx = self.owner(collector).ok_or_else(|| {
                FinderError::UnknownProject(if collector.project.name.is_empty() {
                    collector.name.clone()
                } else {
                    collector.project.name.clone()
                })
            })?;
            partitions[idx].push(collector.clone());
        }

        let searches = self
            .finders
            .iter()
            .zip(partitions)
            .filter(|(_, part)| query.collectors.is_empty() || !part.is_empty())
            .map(|(finder, part)| {
                let sub = query.clone().with_collectors(part);
                async move { finder.find(&sub).await }
            });

        let results = futures::future::try_join_all(searches).await?;
        Ok(results.into_iter().flatten().collect())
    }

    async fn refresh_collectors(&self) -> Result<usize, FinderError> {
        let counts =
            futures::future::try_join_all(self.finders.iter().map(|f| f.refresh_collectors()))
                .await?;
        Ok(counts.into_iter().sum())
    }
}
