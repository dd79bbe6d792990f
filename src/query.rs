//! Query model shared by every provider and the cache store
//!
//! A [`Query`] selects dumps by collector, half-open time window
//! `[from, until)` and dump kind. The two predicates here, [`month_overlaps`]
//! and [`in_range`], are the only place window semantics are defined, so
//! every provider filters identically.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};

use crate::models::{Collector, DumpKind};

/// Discovery query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Collectors to search. Empty means every collector.
    pub collectors: Vec<Collector>,

    /// Window start (inclusive)
    pub from: DateTime<Utc>,

    /// Window end (exclusive)
    pub until: DateTime<Utc>,

    pub kind: DumpKind,
}

impl Query {
    pub fn new(from: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        Self {
            collectors: Vec::new(),
            from,
            until,
            kind: DumpKind::Any,
        }
    }

    pub fn with_collectors(mut self, collectors: Vec<Collector>) -> Self {
        self.collectors = collectors;
        self
    }

    pub fn with_kind(mut self, kind: DumpKind) -> Self {
        self.kind = kind;
        self
    }

    /// An inverted or zero-length window selects nothing
    pub fn is_empty_window(&self) -> bool {
        self.from >= self.until
    }

    /// Whether a month directory starting at `month_start` needs to be listed
    pub fn wants_month(&self, month_start: DateTime<Utc>) -> bool {
        month_overlaps(month_start, self.from, self.until)
    }

    /// Whether a dump stamped `ts` with kind `kind` belongs in the result
    pub fn accepts(&self, ts: DateTime<Utc>, kind: DumpKind) -> bool {
        in_range(ts, self.from, self.until) && kind.matches(self.kind)
    }
}

/// `[month_start, month_start + 1 month)` intersects `[from, until)`
pub fn month_overlaps(month_start: DateTime<Utc>, from: DateTime<Utc>, until: DateTime<Utc>) -> bool {
    match next_month(month_start) {
        Some(month_end) => month_end > from && month_start < until,
        None => month_start < until,
    }
}

/// `from <= ts < until`
pub fn in_range(ts: DateTime<Utc>, from: DateTime<Utc>, until: DateTime<Utc>) -> bool {
    from <= ts && ts < until
}

/// First instant of the calendar month following `month_start`'s month
pub fn next_month(month_start: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let (year, month) = if month_start.month() == 12 {
        (month_start.year() + 1, 1)
    } else {
        (month_start.year(), month_start.month() + 1)
    };
    month_start_utc(year, month)
}

/// Midnight UTC on the first day of `year`-`month`
pub fn month_start_utc(year: i32, month: u32) -> Option<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_month_overlap_partial() {
        let jan = month_start_utc(2021, 1).unwrap();
        assert!(month_overlaps(jan, utc(2021, 1, 10, 0), utc(2021, 1, 20, 0)));
        assert!(month_overlaps(jan, utc(2020, 12, 31, 0), utc(2021, 1, 1, 1)));
        assert!(month_overlaps(jan, utc(2021, 1, 31, 23), utc(2021, 3, 1, 0)));
    }

    #[test]
    fn test_month_overlap_boundaries() {
        let jan = month_start_utc(2021, 1).unwrap();
        // month end == from
        assert!(!month_overlaps(jan, utc(2021, 2, 1, 0), utc(2021, 3, 1, 0)));
        // month start == until
        assert!(!month_overlaps(jan, utc(2020, 12, 1, 0), utc(2021, 1, 1, 0)));
    }

    #[test]
    fn test_december_rolls_over() {
        let dec = month_start_utc(2020, 12).unwrap();
        assert_eq!(next_month(dec), month_start_utc(2021, 1));
        assert!(month_overlaps(dec, utc(2020, 12, 31, 23), utc(2021, 1, 2, 0)));
    }

    #[test]
    fn test_in_range_half_open() {
        let from = utc(2021, 1, 10, 0);
        let until = utc(2021, 1, 20, 0);
        assert!(in_range(from, from, until));
        assert!(!in_range(until, from, until));
        assert!(!in_range(utc(2021, 1, 9, 23), from, until));
    }

    #[test]
    fn test_inverted_window_is_empty() {
        let q = Query::new(utc(2021, 2, 1, 0), utc(2021, 1, 1, 0));
        assert!(q.is_empty_window());
        let zero = Query::new(utc(2021, 1, 1, 0), utc(2021, 1, 1, 0));
        assert!(zero.is_empty_window());
    }

    #[test]
    fn test_accepts_filters_kind() {
        let q = Query::new(utc(2021, 1, 10, 0), utc(2021, 1, 20, 0)).with_kind(DumpKind::Rib);
        assert!(q.accepts(utc(2021, 1, 15, 0), DumpKind::Rib));
        assert!(!q.accepts(utc(2021, 1, 15, 0), DumpKind::Updates));
    }
}
