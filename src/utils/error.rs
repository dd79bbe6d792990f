//! Error types for discovery and storage
//!
//! This module defines the domain error enums shared by the listing client,
//! the finders and the cache store.

use thiserror::Error;

/// Errors raised while fetching a remote listing page
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP transport error
    #[error("HTTP request for {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Non-2xx response
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    /// Request timeout
    #[error("Request for {0} timed out")]
    Timeout(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// HTTP client could not be built
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl FetchError {
    /// Classify a reqwest error for `url`
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(url.to_string())
        } else if let Some(status) = err.status() {
            Self::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }
        } else {
            Self::Http {
                url: url.to_string(),
                source: err,
            }
        }
    }

    /// Whether a later attempt may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Http { .. } | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidUrl(_) | Self::Client(_) => false,
        }
    }

    /// Status code for `Status` errors
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Errors raised by a finder
#[derive(Error, Debug)]
pub enum FinderError {
    /// A listing that the query cannot do without was unreachable
    #[error("Remote fetch failed: {0}")]
    RemoteFetch(#[from] FetchError),

    /// Collector list could not be scraped
    #[error("Failed to get collector list for {project}: {source}")]
    CollectorList {
        project: String,
        #[source]
        source: FetchError,
    },

    /// Collector belongs to a project no finder serves
    #[error("Unknown project '{0}'")]
    UnknownProject(String),
}

impl FinderError {
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::RemoteFetch(e) | Self::CollectorList { source: e, .. } => e.is_recoverable(),
            Self::UnknownProject(_) => false,
        }
    }
}

/// Errors raised by the cache store
#[derive(Error, Debug)]
pub enum StoreError {
    /// Could not obtain a pooled connection
    #[error("Connection pool error: {0}")]
    Pool(String),

    /// Statement or transaction failure; the transaction was rolled back
    #[error("Transaction failed during {operation}: {source}")]
    Transaction {
        operation: &'static str,
        #[source]
        source: tokio_postgres::Error,
    },

    /// Stored value cannot be mapped back to the model
    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

impl StoreError {
    pub fn transaction(operation: &'static str, source: tokio_postgres::Error) -> Self {
        Self::Transaction { operation, source }
    }
}
