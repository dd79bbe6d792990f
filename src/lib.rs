//! bgpfinder - BGP dump discovery for RouteViews and RIPE RIS
//!
//! Locates the MRT RIB snapshots and update files published by public BGP
//! route collector projects, optionally keeping a PostgreSQL cache of them in
//! sync and serving both over a small REST API.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`crawler`] - Rate-limited listing client for archive index pages
//! - [`parser`] - Link extraction and archive name grammars
//! - [`models`] - Projects, collectors, dumps and sync watermarks
//! - [`query`] - Query model and window predicates
//! - [`finder`] - Per-provider discovery behind the `Finder` trait
//! - [`storage`] - Cache store (PostgreSQL, in-memory)
//! - [`scheduler`] - Periodic synchronization of the cache store
//! - [`server`] - REST front end
//! - [`metrics`] - Prometheus metrics
//! - [`utils`] - Common utilities, retry loop and domain errors
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use bgpfinder::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let listing = Arc::new(HttpListing::with_config(&config.http)?);
//!     let finder = MultiFinder::from_archives(listing, &config.archives).await?;
//!
//!     let from = bgpfinder::utils::parse_time("2021-01-10")?;
//!     let until = bgpfinder::utils::parse_time("2021-01-20")?;
//!     let dumps = finder.find(&Query::new(from, until).with_kind(DumpKind::Rib)).await?;
//!     println!("{} RIB dumps", dumps.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod crawler;
pub mod error;
pub mod finder;
pub mod metrics;
pub mod models;
pub mod parser;
pub mod query;
pub mod scheduler;
pub mod server;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::crawler::{HttpListing, ListingSource};
    pub use crate::error::{ClassifiedError, Error, ErrorCategory, Result};
    pub use crate::finder::{Finder, MultiFinder, Provider};
    pub use crate::models::{BgpDump, Collector, DumpKind, Project, SyncState};
    pub use crate::query::Query;
    pub use crate::scheduler::{SyncPair, SyncScheduler};
    pub use crate::storage::{DumpStore, MemoryStore, PostgresStore};
}

// Direct re-exports for convenience
pub use models::{BgpDump, Collector, DumpKind, Project};
pub use query::Query;
