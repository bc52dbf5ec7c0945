//! Core data models for feed monitoring

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifies a monitored feed: the vendor and the folder it delivers into
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeedKey {
    pub vendor: String,
    pub folder: String,
}

impl FeedKey {
    pub fn new(vendor: impl Into<String>, folder: impl Into<String>) -> Self {
        Self {
            vendor: vendor.into(),
            folder: folder.into(),
        }
    }
}

impl fmt::Display for FeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.vendor, self.folder)
    }
}

/// A file seen in a feed folder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileObservation {
    pub name: String,
    pub size_bytes: u64,
    pub arrival_timestamp: DateTime<Utc>,
}

/// One tick's raw observation of a feed folder
///
/// `files` lists every file currently present in the folder. Files whose
/// arrival falls inside the evaluated interval count as new arrivals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSnapshot {
    pub feed_key: FeedKey,
    pub capture_timestamp: DateTime<Utc>,
    pub files: Vec<FileObservation>,
}

impl FeedSnapshot {
    pub fn new(feed_key: FeedKey, capture_timestamp: DateTime<Utc>) -> Self {
        Self {
            feed_key,
            capture_timestamp,
            files: Vec::new(),
        }
    }

    /// Add a file observation
    pub fn with_file(
        mut self,
        name: impl Into<String>,
        size_bytes: u64,
        arrival_timestamp: DateTime<Utc>,
    ) -> Self {
        self.files.push(FileObservation {
            name: name.into(),
            size_bytes,
            arrival_timestamp,
        });
        self
    }

    /// Total bytes currently held in the folder
    pub fn folder_size_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size_bytes).sum()
    }
}

/// Earliest and latest arrival observed within an interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrivalWindow {
    pub earliest: DateTime<Utc>,
    pub latest: DateTime<Utc>,
}

/// Derived metrics for one feed over one interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub interval_start: DateTime<Utc>,
    pub interval_end: DateTime<Utc>,
    /// Absent when nothing arrived during the interval
    pub arrival_window: Option<ArrivalWindow>,
    pub file_count: u64,
    pub size_min: Option<u64>,
    pub size_max: Option<u64>,
    pub size_sum: u64,
    pub folder_size_bytes: u64,
    /// Delta from the previous interval's folder size; absent for the first interval
    pub growth_bytes: Option<i64>,
}

impl MetricsSnapshot {
    /// Interval length in seconds, `None` for a degenerate interval
    pub fn interval_secs(&self) -> Option<f64> {
        let millis = (self.interval_end - self.interval_start).num_milliseconds();
        (millis > 0).then(|| millis as f64 / 1000.0)
    }

    /// Files arrived per second
    pub fn arrival_rate(&self) -> Option<f64> {
        self.interval_secs().map(|secs| self.file_count as f64 / secs)
    }

    /// Folder growth in bytes per second
    pub fn growth_rate(&self) -> Option<f64> {
        let growth = self.growth_bytes?;
        self.interval_secs().map(|secs| growth as f64 / secs)
    }

    /// Mean size of the files that arrived in the interval
    pub fn mean_file_size(&self) -> Option<f64> {
        (self.file_count > 0).then(|| self.size_sum as f64 / self.file_count as f64)
    }
}

/// A metrics snapshot as retained by the history store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub recorded_at: DateTime<Utc>,
    pub metrics: MetricsSnapshot,
}

/// Metrics that carry their own baseline and alert state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricKind {
    ArrivalWindow,
    SizeRange,
    ArrivalRate,
    FolderGrowth,
}

impl MetricKind {
    pub const ALL: [MetricKind; 4] = [
        MetricKind::ArrivalWindow,
        MetricKind::SizeRange,
        MetricKind::ArrivalRate,
        MetricKind::FolderGrowth,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::ArrivalWindow => "ARRIVAL_WINDOW",
            MetricKind::SizeRange => "SIZE_RANGE",
            MetricKind::ArrivalRate => "ARRIVAL_RATE",
            MetricKind::FolderGrowth => "FOLDER_GROWTH",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        MetricKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| format!("unknown metric kind '{}'", s))
    }
}

/// Alert severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertLevel {
    #[default]
    Ok,
    Warning,
    Critical,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertLevel::Ok => write!(f, "OK"),
            AlertLevel::Warning => write!(f, "WARNING"),
            AlertLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Hysteresis state for one (feed, metric) pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertState {
    pub level: AlertLevel,
    pub consecutive_breaches: u32,
    pub consecutive_clears: u32,
    /// Run of breaches that also exceeded the severe band
    #[serde(default)]
    pub consecutive_severe: u32,
}

/// Emitted on every alert level transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub feed_key: FeedKey,
    pub metric_kind: MetricKind,
    pub from_level: AlertLevel,
    pub to_level: AlertLevel,
    pub observed_value: f64,
    pub baseline_value: f64,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn is_escalation(&self) -> bool {
        self.to_level > self.from_level
    }
}

/// Why a feed's tick did not complete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    MalformedSnapshot,
    ClockSkew,
    StoreUnavailable,
    MissedInterval,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::MalformedSnapshot => write!(f, "malformed_snapshot"),
            FailureKind::ClockSkew => write!(f, "clock_skew"),
            FailureKind::StoreUnavailable => write!(f, "store_unavailable"),
            FailureKind::MissedInterval => write!(f, "missed_interval"),
        }
    }
}

/// Ingestion failure surfaced on the read interface (never an alert)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionFailure {
    pub feed_key: FeedKey,
    pub kind: FailureKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Failed ticks in a row for this feed
    pub consecutive: u32,
}
