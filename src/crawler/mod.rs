//! Remote listing client
//!
//! Finders never talk HTTP directly. They ask a [`ListingSource`] for the
//! hyperlinks on a directory page, which keeps every provider testable
//! against an in-memory [`MockListing`].

pub mod fetcher;

pub use fetcher::HttpListing;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::utils::error::FetchError;

/// Source of directory listings
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Fetch `url` and return the hyperlink targets it contains
    async fn list(&self, url: &str) -> Result<Vec<String>, FetchError>;
}

enum MockEntry {
    Links(Vec<String>),
    Status(u16),
}

/// In-memory listing source for tests
///
/// Unknown URLs answer with status 404.
#[derive(Default)]
pub struct MockListing {
    pages: Mutex<HashMap<String, MockEntry>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl MockListing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `links` at `url`
    pub fn insert<I, S>(&self, url: &str, links: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let links = links.into_iter().map(Into::into).collect();
        self.pages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.to_string(), MockEntry::Links(links));
    }

    /// Answer `url` with an HTTP error status
    pub fn insert_status(&self, url: &str, status: u16) {
        self.pages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.to_string(), MockEntry::Status(status));
    }

    /// Number of times `url` was listed
    pub fn calls(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(url)
            .copied()
            .unwrap_or(0)
    }

    /// Total number of listings served
    pub fn total_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .sum()
    }
}

#[async_trait]
impl ListingSource for MockListing {
    async fn list(&self, url: &str) -> Result<Vec<String>, FetchError> {
        *self
            .calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(url.to_string())
            .or_default() += 1;

        let pages = self.pages.lock().unwrap_or_else(|e| e.into_inner());
        match pages.get(url) {
            Some(MockEntry::Links(links)) => Ok(links.clone()),
            Some(MockEntry::Status(status)) => Err(FetchError::Status {
                url: url.to_string(),
                status: *status,
            }),
            None => Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_listing_serves_and_counts() {
        let mock = MockListing::new();
        mock.insert("https://example.org/", ["a/", "b/"]);
        mock.insert_status("https://example.org/down/", 503);

        assert_eq!(mock.list("https://example.org/").await.unwrap(), vec!["a/", "b/"]);
        let err = mock.list("https://example.org/down/").await.unwrap_err();
        assert_eq!(err.status(), Some(503));
        let missing = mock.list("https://example.org/missing/").await.unwrap_err();
        assert_eq!(missing.status(), Some(404));

        assert_eq!(mock.calls("https://example.org/"), 1);
        assert_eq!(mock.total_calls(), 3);
    }
}
