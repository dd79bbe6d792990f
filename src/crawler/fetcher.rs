//! HTTP listing fetcher with rate limiting
//!
//! [`HttpListing`] fetches archive directory pages with:
//! - one shared `reqwest` client (timeout, user agent, gzip)
//! - a `governor` rate limiter shared by every fetch issued through it
//! - a semaphore bounding the number of fetches in flight

use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::Client;
use std::num::NonZeroU32;
use tokio::sync::Semaphore;

use super::ListingSource;
use crate::config::HttpConfig;
use crate::parser::extract_links;
use crate::utils::error::FetchError;

/// Listing client backed by HTTP
pub struct HttpListing {
    /// HTTP client with configured timeout and compression
    client: Client,

    /// Rate limiter to control request frequency
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,

    /// Concurrency bound
    semaphore: Semaphore,
}

impl HttpListing {
    /// Create a listing client with default settings
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Client` if the HTTP client cannot be created
    pub fn new() -> Result<Self, FetchError> {
        Self::with_config(&HttpConfig::default())
    }

    /// Create a listing client from configuration
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Client` if the HTTP client cannot be created
    pub fn with_config(config: &HttpConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.request_timeout())
            .gzip(true)
            .build()
            .map_err(FetchError::Client)?;

        let rate = NonZeroU32::new(config.rate_limit).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(rate));

        Ok(Self {
            client,
            rate_limiter,
            semaphore: Semaphore::new(config.max_concurrent_requests.max(1)),
        })
    }

    /// Fetch a page body
    ///
    /// # Errors
    ///
    /// `FetchError::Status` for non-2xx answers, `FetchError::Timeout` and
    /// `FetchError::Http` for transport failures.
    pub async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        reqwest::Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;

        // Wait for rate limiter
        self.rate_limiter.until_ready().await;

        // A closed semaphore only happens on drop; fall through without a permit.
        let _permit = self.semaphore.acquire().await.ok();

        tracing::debug!(url = %url, "Fetching listing");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))
    }
}

#[async_trait]
impl ListingSource for HttpListing {
    async fn list(&self, url: &str) -> Result<Vec<String>, FetchError> {
        let body = self.fetch_text(url).await?;
        let links = extract_links(&body);
        tracing::trace!(url = %url, links = links.len(), "Listing parsed");
        Ok(links)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_creation_configs() {
        assert!(HttpListing::new().is_ok());

        let config = HttpConfig {
            rate_limit: 0,
            max_concurrent_requests: 0,
            ..HttpConfig::default()
        };
        assert!(HttpListing::with_config(&config).is_ok());
    }

    #[tokio::test]
    async fn test_invalid_url_rejected() {
        let listing = HttpListing::new().unwrap();
        let err = listing.list("not a url").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl(_)));
    }
}
