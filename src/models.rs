// Core data structures shared by finders, the cache store and the scheduler

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// An archive provider (RouteViews, RIPE RIS)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Project {
    pub name: String,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// CSV form used by the CLI
    pub fn as_csv(&self) -> String {
        self.name.clone()
    }
}

impl fmt::Display for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A named vantage point belonging to exactly one project
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Collector {
    /// Project the collector belongs to
    pub project: Project,

    /// Collector name, unique across all projects (e.g. "rrc00", "route-views2")
    pub name: String,
}

impl Collector {
    pub fn new(project: &Project, name: impl Into<String>) -> Self {
        Self {
            project: project.clone(),
            name: name.into(),
        }
    }

    pub fn as_csv(&self) -> String {
        format!("{},{}", self.project.as_csv(), self.name)
    }
}

impl fmt::Display for Collector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.project, self.name)
    }
}

/// Kind of dump file. `Any` only appears in queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DumpKind {
    #[default]
    Any,
    Rib,
    Updates,
}

impl DumpKind {
    /// Concrete kinds a discovered dump can carry
    pub const CONCRETE: [DumpKind; 2] = [DumpKind::Rib, DumpKind::Updates];

    /// Wire token used by the REST surface and the CLI
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Rib => "rib",
            Self::Updates => "updates",
        }
    }

    /// Parse a wire token ("ribs" is accepted as a BGPStream-compatible alias)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any" | "" => Some(Self::Any),
            "rib" | "ribs" => Some(Self::Rib),
            "updates" | "update" => Some(Self::Updates),
            _ => None,
        }
    }

    /// Whether a dump of kind `self` satisfies the filter `filter`
    pub fn matches(&self, filter: DumpKind) -> bool {
        filter == DumpKind::Any || *self == filter
    }

    /// Concrete kinds selected by this filter
    pub fn expand(&self) -> Vec<DumpKind> {
        match self {
            Self::Any => Self::CONCRETE.to_vec(),
            other => vec![*other],
        }
    }

    /// Value stored in the `dump_type` SMALLINT column
    pub fn to_db(&self) -> i16 {
        match self {
            Self::Any => 0,
            Self::Rib => 1,
            Self::Updates => 2,
        }
    }

    pub fn from_db(value: i16) -> Option<Self> {
        match value {
            0 => Some(Self::Any),
            1 => Some(Self::Rib),
            2 => Some(Self::Updates),
            _ => None,
        }
    }
}

impl fmt::Display for DumpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DumpKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid dump type '{s}' (expected any, rib or updates)"))
    }
}

/// A located dump file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BgpDump {
    /// Absolute URL of the file
    pub url: String,

    /// Collector that produced the file
    pub collector: Collector,

    #[serde(rename = "dump_type")]
    pub kind: DumpKind,

    /// Nominal wall-clock time covered by the dump
    #[serde(with = "duration_secs")]
    pub duration: Duration,

    /// Nominal creation instant, seconds since the Unix epoch
    pub timestamp: i64,
}

impl BgpDump {
    /// Timestamp as a UTC date-time
    pub fn time(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.timestamp, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    pub fn as_csv(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.collector.as_csv(),
            self.kind,
            self.timestamp,
            self.duration.as_secs(),
            self.url
        )
    }
}

/// Per-(collector, kind) synchronisation watermark
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncState {
    pub collector: Collector,
    pub kind: DumpKind,

    /// Start instant of the last cycle that completed for this collector
    pub last_completed_crawl: DateTime<Utc>,

    /// Newest dump timestamp seen so far, seconds since the epoch
    pub latest_dump: Option<i64>,
}

impl SyncState {
    /// Lower bound for the next discovery window
    pub fn watermark(&self) -> DateTime<Utc> {
        match self.latest_dump {
            Some(ts) => Utc
                .timestamp_opt(ts, 0)
                .single()
                .unwrap_or(self.last_completed_crawl),
            None => self.last_completed_crawl,
        }
    }

    /// State after a successful cycle that found `dumps`
    pub fn advance(&self, crawl_started: DateTime<Utc>, dumps: &[BgpDump]) -> Self {
        let newest = dumps.iter().map(|d| d.timestamp).max();
        Self {
            collector: self.collector.clone(),
            kind: self.kind,
            last_completed_crawl: crawl_started,
            latest_dump: match (self.latest_dump, newest) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            },
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
