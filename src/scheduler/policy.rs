//! Synchronization pairs and their timing policies
//!
//! A pair is one (project, dump kind) combination the scheduler keeps in
//! sync. Each runs on its own cadence:
//!
//! | pair | interval | base backoff |
//! |------|----------|--------------|
//! | routeviews/rib | 2 h | interval/128 |
//! | routeviews/updates | 15 min | interval/128 |
//! | ris/rib | 8 h | interval/128 |
//! | ris/updates | 5 min | interval/128 |

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::finder::Provider;
use crate::models::DumpKind;
use crate::utils::retry::RetryConfig;

/// One (provider, kind) combination kept in sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SyncPair {
    pub provider: Provider,
    pub kind: DumpKind,
}

impl SyncPair {
    pub const ALL: [SyncPair; 4] = [
        SyncPair::new(Provider::RouteViews, DumpKind::Rib),
        SyncPair::new(Provider::RouteViews, DumpKind::Updates),
        SyncPair::new(Provider::Ris, DumpKind::Rib),
        SyncPair::new(Provider::Ris, DumpKind::Updates),
    ];

    pub const fn new(provider: Provider, kind: DumpKind) -> Self {
        Self { provider, kind }
    }

    /// Default policy for this pair
    pub fn policy(&self) -> SyncPolicy {
        let interval = match (self.provider, self.kind) {
            (Provider::RouteViews, DumpKind::Rib) => Duration::from_secs(2 * 60 * 60),
            (Provider::RouteViews, _) => Duration::from_secs(15 * 60),
            (Provider::Ris, DumpKind::Rib) => Duration::from_secs(8 * 60 * 60),
            (Provider::Ris, _) => Duration::from_secs(5 * 60),
        };
        SyncPolicy::for_interval(interval)
    }
}

impl fmt::Display for SyncPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.kind)
    }
}

impl FromStr for SyncPair {
    type Err = String;

    /// Accepts `project/kind`, e.g. `ris/updates`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (project, kind) = s
            .split_once('/')
            .ok_or_else(|| format!("expected PROJECT/KIND, got '{s}'"))?;
        let provider: Provider = project.parse()?;
        let kind = match DumpKind::parse(kind) {
            Some(k @ (DumpKind::Rib | DumpKind::Updates)) => k,
            _ => return Err(format!("kind must be rib or updates, got '{kind}'")),
        };
        Ok(Self::new(provider, kind))
    }
}

/// Timing of one pair's loop
#[derive(Debug, Clone, PartialEq)]
pub struct SyncPolicy {
    /// Cycle period; wake-ups are aligned to multiples of it since the epoch
    pub interval: Duration,

    /// Sleep before the second find attempt
    pub base_backoff: Duration,

    pub backoff_multiplier: f64,

    /// Find attempts per collector, the first one included
    pub max_attempts: u32,

    /// How far past now the discovery window reaches
    pub forward_margin: Duration,

    /// Delay after each aligned boundary
    pub alignment_buffer: Duration,
}

impl SyncPolicy {
    pub fn for_interval(interval: Duration) -> Self {
        Self {
            interval,
            base_backoff: interval / 128,
            backoff_multiplier: 2.0,
            max_attempts: 4,
            forward_margin: Duration::from_secs(24 * 60 * 60),
            alignment_buffer: Duration::from_secs(30),
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            base_delay: self.base_backoff,
            backoff_multiplier: self.backoff_multiplier,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_intervals() {
        let secs: Vec<u64> = SyncPair::ALL
            .iter()
            .map(|p| p.policy().interval.as_secs())
            .collect();
        assert_eq!(secs, vec![7200, 900, 28800, 300]);
    }

    #[test]
    fn test_ris_updates_backoff() {
        let policy = SyncPair::new(Provider::Ris, DumpKind::Updates).policy();
        let retry = policy.retry_config();
        assert_eq!(retry.max_attempts, 4);
        assert_eq!(policy.base_backoff, Duration::from_micros(2_343_750));
        assert_eq!(retry.delay_before(2), policy.base_backoff);
        assert_eq!(retry.delay_before(3), policy.base_backoff * 2);
        assert_eq!(retry.delay_before(4), policy.base_backoff * 4);
    }

    #[test]
    fn test_pair_parsing() {
        let pair: SyncPair = "routeviews/rib".parse().unwrap();
        assert_eq!(pair, SyncPair::new(Provider::RouteViews, DumpKind::Rib));
        assert_eq!(pair.to_string(), "routeviews/rib");
        assert_eq!(
            "ris/updates".parse::<SyncPair>(),
            Ok(SyncPair::new(Provider::Ris, DumpKind::Updates))
        );
        assert!("ris".parse::<SyncPair>().is_err());
        assert!("ris/any".parse::<SyncPair>().is_err());
        assert!("pch/rib".parse::<SyncPair>().is_err());
    }
}
