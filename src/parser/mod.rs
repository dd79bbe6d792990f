//! Listing page parsing
//!
//! Archive directory listings are plain auto-index HTML pages. This module
//! extracts their hyperlinks and turns listing entries into the tokens the
//! finders work with (month directories and embedded file timestamps).
//! Nothing here ever fails a query: malformed input yields `None` or is
//! dropped.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use scraper::{Html, Selector};
use std::collections::HashSet;

use crate::query::month_start_utc;

/// Extract every hyperlink target from a listing page
///
/// Targets come back in document order with duplicates removed. Sort
/// links (`?C=N;O=D`), anchors (`#top`) and parent/self links are dropped.
pub fn extract_links(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    document
        .select(&selector)
        .filter_map(|a| a.value().attr("href"))
        .map(str::trim)
        .filter(|href| is_listing_entry(href))
        .filter(|href| seen.insert(href.to_string()))
        .map(str::to_string)
        .collect()
}

fn is_listing_entry(href: &str) -> bool {
    !(href.is_empty()
        || href.starts_with('?')
        || href.starts_with('#')
        || href == "../"
        || href == ".."
        || href == "./"
        || href == ".")
}

/// Last path segment of a link, without a trailing slash
///
/// `"2021.01/"` and `"https://host/rrc00/2021.01/"` both give `"2021.01"`.
pub fn entry_name(link: &str) -> &str {
    let trimmed = link.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Parse a `YYYY.MM` month directory entry into the month's first instant
///
/// Entries like `logs/` or `latest/` return `None`.
pub fn parse_month_dir(entry: &str) -> Option<DateTime<Utc>> {
    let name = entry_name(entry);
    let (year, month) = name.split_once('.')?;
    if year.len() != 4 || month.len() != 2 {
        return None;
    }
    if !year.bytes().chain(month.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }
    month_start_utc(year.parse().ok()?, month.parse().ok()?)
}

/// Parse the `YYYYMMDD` and `HHMM` parts of a dump file name as UTC
pub fn parse_file_timestamp(date: &str, time: &str) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(date, "%Y%m%d").ok()?;
    let time = chrono::NaiveTime::parse_from_str(time, "%H%M").ok()?;
    Some(Utc.from_utc_datetime(&NaiveDateTime::new(date, time)))
}
