//! Configuration management for bgpfinder
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files. Command-line flags override individual fields
//! after loading.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listing client configuration
    pub http: HttpConfig,

    /// Archive locations
    pub archives: ArchiveConfig,

    /// PostgreSQL cache store
    pub database: DatabaseConfig,

    /// Background synchronization
    pub sync: SyncConfig,

    /// REST front end
    pub server: ServerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Listing client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Maximum number of listing fetches in flight
    pub max_concurrent_requests: usize,

    /// Rate limit (requests per second)
    pub rate_limit: u32,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// User agent string
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 16,
            rate_limit: 20,
            request_timeout_secs: 60,
            user_agent: format!("bgpfinder/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpConfig {
    /// Per-request timeout, at least one second
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Archive root URLs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// RouteViews archive root (collector list and data)
    pub routeviews_url: String,

    /// Page listing the RIS route collectors
    pub ris_collectors_url: String,

    /// RIS data root, one directory per collector
    pub ris_data_url: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            routeviews_url: String::from("https://archive.routeviews.org/"),
            ris_collectors_url: String::from("https://ris.ripe.net/docs/route-collectors/"),
            ris_data_url: String::from("https://data.ris.ripe.net/"),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Use the cache store at all
    pub enabled: bool,

    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub dbname: Option<String>,

    /// Maximum pool size
    pub pool_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: String::from("localhost"),
            port: 5432,
            user: None,
            password: None,
            dbname: None,
            pool_size: 10,
        }
    }
}

/// Background synchronization configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Run the scheduler alongside the server
    pub enabled: bool,

    /// Lower bound (epoch seconds) for collectors that were never synced
    pub backfill_from: i64,
}

/// REST front end configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    /// Enable CORS
    pub enable_cors: bool,

    /// Enable request logging
    pub enable_request_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::from("0.0.0.0"),
            port: 8080,
            enable_cors: true,
            enable_request_logging: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["text", "json"];

impl LoggingConfig {
    /// `EnvFilter` directives for the crate at the configured level
    ///
    /// `verbose` raises the crate to debug and other crates to info.
    #[must_use]
    pub fn filter_directives(&self, verbose: bool) -> String {
        if verbose {
            return String::from("bgpfinder=debug,bgpf=debug,info");
        }
        let level = self.level.trim().to_ascii_lowercase();
        format!("bgpfinder={level},bgpf={level},warn")
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Store credentials come from `POSTGRES_HOST`, `POSTGRES_PORT`,
    /// `POSTGRES_USER`, `POSTGRES_PASSWORD` and `POSTGRES_DB`; everything
    /// else from `BGPFINDER_*` variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Some(v) = env_parse("BGPFINDER_MAX_CONCURRENT_REQUESTS") {
            self.http.max_concurrent_requests = v;
        }
        if let Some(v) = env_parse("BGPFINDER_RATE_LIMIT") {
            self.http.rate_limit = v;
        }
        if let Some(v) = env_parse("BGPFINDER_REQUEST_TIMEOUT") {
            self.http.request_timeout_secs = v;
        }
        if let Ok(v) = std::env::var("BGPFINDER_USER_AGENT") {
            self.http.user_agent = v;
        }

        if let Ok(v) = std::env::var("BGPFINDER_ROUTEVIEWS_URL") {
            self.archives.routeviews_url = v;
        }
        if let Ok(v) = std::env::var("BGPFINDER_RIS_COLLECTORS_URL") {
            self.archives.ris_collectors_url = v;
        }
        if let Ok(v) = std::env::var("BGPFINDER_RIS_DATA_URL") {
            self.archives.ris_data_url = v;
        }

        if let Some(v) = env_flag("BGPFINDER_USE_DB") {
            self.database.enabled = v;
        }
        if let Ok(v) = std::env::var("POSTGRES_HOST") {
            self.database.host = v;
        }
        if let Some(v) = env_parse("POSTGRES_PORT") {
            self.database.port = v;
        }
        if let Ok(v) = std::env::var("POSTGRES_USER") {
            self.database.user = Some(v);
        }
        if let Ok(v) = std::env::var("POSTGRES_PASSWORD") {
            self.database.password = Some(v);
        }
        if let Ok(v) = std::env::var("POSTGRES_DB") {
            self.database.dbname = Some(v);
        }
        if let Some(v) = env_parse("BGPFINDER_DB_POOL_SIZE") {
            self.database.pool_size = v;
        }

        if let Some(v) = env_flag("BGPFINDER_SYNC") {
            self.sync.enabled = v;
        }
        if let Some(v) = env_parse("BGPFINDER_BACKFILL_FROM") {
            self.sync.backfill_from = v;
        }

        if let Ok(v) = std::env::var("BGPFINDER_HOST") {
            self.server.host = v;
        }
        if let Some(v) = env_parse("BGPFINDER_PORT") {
            self.server.port = v;
        }

        if let Ok(v) = std::env::var("BGPFINDER_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Ok(v) = std::env::var("BGPFINDER_LOG_FORMAT") {
            self.logging.format = v;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.http.max_concurrent_requests == 0 {
            anyhow::bail!("max_concurrent_requests must be greater than 0");
        }

        if self.http.rate_limit == 0 {
            anyhow::bail!("rate_limit must be positive");
        }

        if self.http.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be positive");
        }

        for (name, url) in [
            ("routeviews_url", &self.archives.routeviews_url),
            ("ris_collectors_url", &self.archives.ris_collectors_url),
            ("ris_data_url", &self.archives.ris_data_url),
        ] {
            url::Url::parse(url).with_context(|| format!("{name} is not a valid URL: {url}"))?;
        }

        if self.database.enabled {
            if self.database.pool_size == 0 {
                anyhow::bail!("pool_size must be greater than 0");
            }
            let missing: Vec<&str> = [
                ("POSTGRES_USER", &self.database.user),
                ("POSTGRES_PASSWORD", &self.database.password),
                ("POSTGRES_DB", &self.database.dbname),
            ]
            .into_iter()
            .filter(|(_, v)| v.as_deref().map_or(true, str::is_empty))
            .map(|(k, _)| k)
            .collect();
            if !missing.is_empty() {
                anyhow::bail!(
                    "database is enabled but credentials are missing: {}",
                    missing.join(", ")
                );
            }
        }

        if !LOG_LEVELS.contains(&self.logging.level.trim().to_ascii_lowercase().as_str()) {
            anyhow::bail!(
                "log level must be one of {}, got '{}'",
                LOG_LEVELS.join(", "),
                self.logging.level
            );
        }
        if !LOG_FORMATS.contains(&self.logging.format.as_str()) {
            anyhow::bail!(
                "log format must be one of {}, got '{}'",
                LOG_FORMATS.join(", "),
                self.logging.format
            );
        }

        if self.sync.enabled && !self.database.enabled {
            anyhow::bail!("sync requires the database to be enabled");
        }

        Ok(())
    }

}
