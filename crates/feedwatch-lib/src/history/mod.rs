//! Time-bounded per-feed history of interval metrics
//!
//! The store retains one record per evaluated interval and answers
//! median queries over whatever is currently retained. Eviction is driven
//! by record timestamps, so missed ticks simply mean fewer records.

mod memory;

pub use memory::InMemoryHistoryStore;

use crate::error::StoreError;
use crate::models::{FeedKey, HistoryRecord, MetricsSnapshot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Picks one numeric value out of an interval's metrics
pub type MetricSelector = fn(&MetricsSnapshot) -> Option<f64>;

/// Storage for per-feed history records
///
/// Implementations must keep each feed's records in non-decreasing
/// `recorded_at` order and apply an append atomically.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append a record stamped with `now`. A record already stamped with
    /// the same instant is replaced.
    async fn append(
        &self,
        feed: &FeedKey,
        metrics: MetricsSnapshot,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Drop records stamped before `cutoff`, returning how many were removed
    async fn purge_older_than(
        &self,
        feed: &FeedKey,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, StoreError>;

    /// Retained records for a feed, oldest first
    async fn records(&self, feed: &FeedKey) -> Result<Vec<HistoryRecord>, StoreError>;

    /// Replace a feed's history wholesale (state restore)
    async fn restore(&self, feed: &FeedKey, records: Vec<HistoryRecord>)
        -> Result<(), StoreError>;

    /// Feeds that currently have any history
    async fn feeds(&self) -> Vec<FeedKey>;

    /// Records retained across all feeds
    async fn record_count(&self) -> usize {
        let mut total = 0;
        for feed in self.feeds().await {
            total += self.records(&feed).await.map(|r| r.len()).unwrap_or(0);
        }
        total
    }

    /// Median of the selected metric over records stamped at or after `since`
    async fn median(
        &self,
        feed: &FeedKey,
        selector: MetricSelector,
        since: DateTime<Utc>,
    ) -> Result<Option<f64>, StoreError> {
        let records = self.records(feed).await?;
        let mut values: Vec<f64> = records
            .iter()
            .filter(|r| r.recorded_at >= since)
            .filter_map(|r| selector(&r.metrics))
            .collect();
        Ok(median(&mut values))
    }
}

/// Statistical median; the mean of the two central values for even counts
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Median absolute deviation from the median
pub fn median_absolute_deviation(values: &[f64]) -> Option<f64> {
    let mut sorted = values.to_vec();
    let center = median(&mut sorted)?;
    let mut deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    median(&mut deviations)
}
