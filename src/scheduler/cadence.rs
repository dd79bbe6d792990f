//! Wall-clock alignment of cycle wake-ups

use chrono::{DateTime, TimeZone, Utc};
use std::time::Duration;

/// Next interval boundary after `now`, counted from the Unix epoch, plus `buffer`
///
/// `floor(now / interval) * interval + interval + buffer`. A boundary that
/// `now` sits exactly on is skipped; the next one is returned.
pub fn next_aligned_instant(
    now: DateTime<Utc>,
    interval: Duration,
    buffer: Duration,
) -> DateTime<Utc> {
    let step = interval.as_millis().max(1) as i64;
    let now_ms = now.timestamp_millis();
    let boundary = now_ms.div_euclid(step) * step + step;
    let target = boundary + buffer.as_millis() as i64;
    Utc.timestamp_millis_opt(target).single().unwrap_or(now)
}

/// Wake-up for the cycle after one that woke at `previous`
///
/// Steps one interval past the boundary `previous` belonged to, so a cycle
/// that ends inside the alignment buffer still runs the following boundary.
/// When that instant has already passed at `now`, the next boundary after
/// `now` is returned and the flag is set.
pub fn following_wake(
    previous: DateTime<Utc>,
    now: DateTime<Utc>,
    interval: Duration,
    buffer: Duration,
) -> (DateTime<Utc>, bool) {
    let buffer_delta = chrono::Duration::milliseconds(buffer.as_millis() as i64);
    let next = next_aligned_instant(previous - buffer_delta, interval, buffer);
    if next > now {
        (next, false)
    } else {
        (next_aligned_instant(now, interval, buffer), true)
    }
}

/// Time left until `target`, zero if already passed
pub fn until(now: DateTime<Utc>, target: DateTime<Utc>) -> Duration {
    (target - now).to_std().unwrap_or(Duration::ZERO)
}
