//! Prometheus metrics for the REST front end and the sync scheduler
//!
//! This module provides metrics tracking for:
//! - Server: requests per route and status, cache hits and misses
//! - Scheduler: cycle duration, collectors synced or failed, find attempts, dumps
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for the server metrics
struct ServerMetrics {
    api_requests: CounterVec,
    api_duration: HistogramVec,
    cache_lookups: CounterVec,
}

/// Container for the scheduler metrics
struct SyncMetrics {
    cycle_duration: HistogramVec,
    collectors: CounterVec,
    find_attempts: CounterVec,
    dumps_found: CounterVec,
    dumps_written: CounterVec,
    last_success: GaugeVec,
}

static SERVER_METRICS: OnceLock<ServerMetrics> = OnceLock::new();

static SYNC_METRICS: OnceLock<SyncMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// This function should be called once at application startup.
/// If metric registration fails, subsequent metric operations become no-ops.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = bgpfinder::metrics::init_metrics() {
///     tracing::warn!(error = %e, "Metrics initialization failed");
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let server = ServerMetrics {
        api_requests: register_counter_vec!(
            "bgpfinder_api_requests_total",
            "Total API requests by route and status",
            &["route", "status"]
        )?,
        api_duration: register_histogram_vec!(
            "bgpfinder_api_request_duration_seconds",
            "API request duration in seconds",
            &["route"],
            vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
        )?,
        cache_lookups: register_counter_vec!(
            "bgpfinder_cache_lookups_total",
            "Cache store lookups for /data by outcome",
            &["outcome"]
        )?,
    };

    let sync = SyncMetrics {
        cycle_duration: register_histogram_vec!(
            "bgpfinder_sync_cycle_duration_seconds",
            "Time spent in one synchronization cycle",
            &["pair"],
            vec![1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0]
        )?,
        collectors: register_counter_vec!(
            "bgpfinder_sync_collectors_total",
            "Collectors processed per cycle by outcome",
            &["pair", "outcome"]
        )?,
        find_attempts: register_counter_vec!(
            "bgpfinder_sync_find_attempts_total",
            "Find attempts made by the scheduler, retries included",
            &["pair"]
        )?,
        dumps_found: register_counter_vec!(
            "bgpfinder_sync_dumps_found_total",
            "Dumps discovered by the scheduler",
            &["pair"]
        )?,
        dumps_written: register_counter_vec!(
            "bgpfinder_sync_dumps_written_total",
            "Dump rows written to the cache store",
            &["pair"]
        )?,
        last_success: register_gauge_vec!(
            "bgpfinder_sync_last_success_timestamp_seconds",
            "Start time of the last cycle with at least one synced collector",
            &["pair"]
        )?,
    };

    SERVER_METRICS.set(server).map_err(|_| "Server metrics already initialized")?;
    SYNC_METRICS.set(sync).map_err(|_| "Sync metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    SERVER_METRICS.get().is_some() && SYNC_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record API request
pub fn record_api_request(route: &str, status: u16, duration_secs: f64) {
    let Some(m) = SERVER_METRICS.get() else {
        return;
    };

    let status_str = status.to_string();
    m.api_requests.with_label_values(&[route, &status_str]).inc();
    m.api_duration.with_label_values(&[route]).observe(duration_secs);
}

/// Record the outcome of a cache store lookup: `hit`, `miss`, `bypass` or `error`
pub fn record_cache_lookup(outcome: &str) {
    if let Some(m) = SERVER_METRICS.get() {
        m.cache_lookups.with_label_values(&[outcome]).inc();
    }
}

/// Record a finished synchronization cycle
pub fn record_sync_cycle(
    pair: &str,
    succeeded: usize,
    failed: usize,
    duration_secs: f64,
    started_at: i64,
) {
    let Some(m) = SYNC_METRICS.get() else {
        return;
    };

    m.cycle_duration.with_label_values(&[pair]).observe(duration_secs);
    if succeeded > 0 {
        m.collectors
            .with_label_values(&[pair, "succeeded"])
            .inc_by(succeeded as f64);
        m.last_success.with_label_values(&[pair]).set(started_at as f64);
    }
    if failed > 0 {
        m.collectors
            .with_label_values(&[pair, "failed"])
            .inc_by(failed as f64);
    }
}

/// Record find attempts made for one collector
pub fn record_find_attempts(pair: &str, attempts: u32) {
    if let Some(m) = SYNC_METRICS.get() {
        m.find_attempts.with_label_values(&[pair]).inc_by(attempts as f64);
    }
}

/// Record dumps discovered and written for one collector
pub fn record_dumps(pair: &str, found: usize, written: usize) {
    let Some(m) = SYNC_METRICS.get() else {
        return;
    };

    if found > 0 {
        m.dumps_found.with_label_values(&[pair]).inc_by(found as f64);
    }
    if written > 0 {
        m.dumps_written.with_label_values(&[pair]).inc_by(written as f64);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ensure_metrics_initialized() {
        let _ = init_metrics();
    }

    #[test]
    fn test_init_metrics() {
        assert!(init_metrics().is_ok());
        // idempotent
        assert!(init_metrics().is_ok());
    }

    #[test]
    fn test_metrics_initialized() {
        ensure_metrics_initialized();
        assert!(metrics_initialized());
    }

    #[test]
    fn test_encode_metrics() {
        ensure_metrics_initialized();
        record_api_request("/data", 200, 0.01);
        let text = encode_metrics().unwrap();
        assert!(text.contains("bgpfinder_api_requests_total"));
    }

    #[test]
    fn test_sync_recording() {
        ensure_metrics_initialized();
        record_sync_cycle("ris/updates", 2, 1, 3.5, 1_610_668_800);
        record_find_attempts("ris/updates", 4);
        record_dumps("ris/updates", 12, 12);
        record_cache_lookup("hit");
        let text = encode_metrics().unwrap();
        assert!(text.contains("bgpfinder_sync_dumps_found_total"));
    }
}
