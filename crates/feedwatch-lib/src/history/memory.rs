//! In-process history store

use super::HistoryStore;
use crate::error::StoreError;
use crate::models::{FeedKey, HistoryRecord, MetricsSnapshot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use tracing::debug;

/// History kept in memory, one ordered deque per feed
///
/// Feeds live in separate map shards, so writers for different feeds do
/// not contend on a single lock.
#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    feeds: DashMap<FeedKey, VecDeque<HistoryRecord>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records retained for a feed
    pub fn len(&self, feed: &FeedKey) -> usize {
        self.feeds.get(feed).map(|r| r.len()).unwrap_or(0)
    }

    /// Total records across all feeds
    pub fn total_records(&self) -> usize {
        self.feeds.iter().map(|r| r.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(
        &self,
        feed: &FeedKey,
        metrics: MetricsSnapshot,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut records = self.feeds.entry(feed.clone()).or_default();
        let record = HistoryRecord {
            recorded_at: now,
            metrics,
        };

        let idx = records.partition_point(|r| r.recorded_at <= now);
        if idx > 0 && records[idx - 1].recorded_at == now {
            debug!(feed = %feed, recorded_at = %now, "Replacing record with same timestamp");
            records[idx - 1] = record;
        } else {
            records.insert(idx, record);
        }
        Ok(())
    }

    async fn purge_older_than(
        &self,
        feed: &FeedKey,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut removed = 0;
        if let Some(mut records) = self.feeds.get_mut(feed) {
            while let Some(front) = records.front() {
                if front.recorded_at < cutoff {
                    records.pop_front();
                    removed += 1;
                } else {
                    break;
                }
            }
        }
        self.feeds.remove_if(feed, |_, records| records.is_empty());

        if removed > 0 {
            debug!(feed = %feed, removed, cutoff = %cutoff, "Purged expired history");
        }
        Ok(removed)
    }

    async fn records(&self, feed: &FeedKey) -> Result<Vec<HistoryRecord>, StoreError> {
        Ok(self
            .feeds
            .get(feed)
            .map(|r| r.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn restore(
        &self,
        feed: &FeedKey,
        mut records: Vec<HistoryRecord>,
    ) -> Result<(), StoreError> {
        if records.is_empty() {
            self.feeds.remove(feed);
            return Ok(());
        }
        records.sort_by_key(|r| r.recorded_at);
        self.feeds.insert(feed.clone(), records.into());
        Ok(())
    }

    async fn feeds(&self) -> Vec<FeedKey> {
        self.feeds.iter().map(|r| r.key().clone()).collect()
    }

    async fn record_count(&self) -> usize {
        self.total_records()
    }
}
