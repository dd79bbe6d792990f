//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the application.

pub mod error;
pub mod retry;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Parse a user-supplied instant.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS`,
/// `YYYY-MM-DD` and Unix epoch seconds. Naive forms are taken as UTC.
pub fn parse_time(input: &str) -> Result<DateTime<Utc>> {
    let s = input.trim();

    if let Ok(secs) = s.parse::<i64>() {
        return Utc
            .timestamp_opt(secs, 0)
            .single()
            .with_context(|| format!("Epoch seconds out of range: {s}"));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Unrecognised time format: {s}"))?;
    date.and_hms_opt(0, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .with_context(|| format!("Invalid date: {s}"))
}

/// Join `base` and a listing entry, keeping absolute entries intact
pub fn join_url(base: &str, entry: &str) -> Option<String> {
    let base = url::Url::parse(base).ok()?;
    base.join(entry).ok().map(|u| u.to_string())
}
