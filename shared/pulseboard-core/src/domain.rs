//! Snapshot data model: per-category summaries, bucketed time series,
//! and the trailing windows they are computed over

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Categories the seeded store carries. Report generation filters
/// requested categories against this list before touching SQL.
pub const KNOWN_CATEGORIES: [&str; 5] =
    ["revenue", "users", "conversion", "engagement", "performance"];

/// Trailing time window a snapshot or query is computed over.
///
/// Windows are a closed set. SQL only ever sees hour counts and bucket
/// names derived from these variants, so arbitrary user input can never
/// reach an interval expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeWindow {
    LastHour,
    Last24Hours,
    Last7Days,
    Last30Days,
}

impl TimeWindow {
    /// Parse the public range parameter ("1h", "24h", "7d", "30d").
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "1h" => Some(Self::LastHour),
            "24h" => Some(Self::Last24Hours),
            "7d" => Some(Self::Last7Days),
            "30d" => Some(Self::Last30Days),
            _ => None,
        }
    }

    pub fn as_param(&self) -> &'static str {
        match self {
            Self::LastHour => "1h",
            Self::Last24Hours => "24h",
            Self::Last7Days => "7d",
            Self::Last30Days => "30d",
        }
    }

    /// Window length in hours. Always within [0, 8760].
    pub fn hours(&self) -> u32 {
        match self {
            Self::LastHour => 1,
            Self::Last24Hours => 24,
            Self::Last7Days => 24 * 7,
            Self::Last30Days => 24 * 30,
        }
    }

    /// Bucket granularity for time-series aggregation over this window.
    /// 30 days deliberately reuses day buckets rather than week.
    pub fn bucket(&self) -> Bucket {
        match self {
            Self::LastHour => Bucket::Minute,
            Self::Last24Hours => Bucket::Hour,
            Self::Last7Days => Bucket::Day,
            Self::Last30Days => Bucket::Day,
        }
    }
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self::Last24Hours
    }
}

/// DATE_TRUNC granularity. The full allow-list is wider than what
/// `TimeWindow::bucket` reaches so saved report configs can name any of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

impl Bucket {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "minute" => Some(Self::Minute),
            "hour" => Some(Self::Hour),
            "day" => Some(Self::Day),
            "week" => Some(Self::Week),
            "month" => Some(Self::Month),
            _ => None,
        }
    }
}

/// Aggregate statistics for one category over the window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category: String,
    pub count: u64,
    pub avg: f64,
    pub sum: f64,
    pub max: f64,
    pub min: f64,
    pub latest_timestamp: DateTime<Utc>,
}

/// One time-series point: average and sample count for a category within
/// one bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeBucketPoint {
    pub bucket_start: DateTime<Utc>,
    pub category: String,
    pub avg: f64,
    pub count: u64,
}

/// The two aggregate views a snapshot carries. Summaries are ordered by
/// category ascending; series by bucket_start then category. Categories
/// with no samples in the window are absent, not zeroed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotData {
    pub metrics: Vec<CategorySummary>,
    #[serde(rename = "timeSeries")]
    pub time_series: Vec<TimeBucketPoint>,
}

/// Immutable point-in-time view of the store's aggregates. Shared as
/// `Arc<Snapshot>`; the current-snapshot cell is replaced, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub generated_at: DateTime<Utc>,
    pub data: SnapshotData,
}

impl Snapshot {
    pub fn new(data: SnapshotData) -> Self {
        Self {
            generated_at: Utc::now(),
            data,
        }
    }
}
