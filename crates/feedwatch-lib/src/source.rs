//! Snapshot acquisition
//!
//! The engine never polls the filesystem itself. A [`SnapshotSource`]
//! produces one [`FeedSnapshot`] per feed per tick and the scheduler hands
//! them over.

use crate::clock::{Clock, SystemClock};
use crate::models::{FeedKey, FeedSnapshot, FileObservation};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Produces snapshots for the monitored feeds
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Feeds to capture this tick
    async fn feeds(&self) -> Vec<FeedKey>;

    /// Observe one feed's folder
    async fn capture(&self, feed: &FeedKey) -> Result<FeedSnapshot>;
}

/// Lists regular files in each feed folder
///
/// A file's modification time stands in for its arrival time. Hidden files
/// and subdirectories are ignored.
pub struct FolderScanner {
    feeds: Vec<FeedKey>,
    clock: Arc<dyn Clock>,
}

impl FolderScanner {
    pub fn new(feeds: Vec<FeedKey>) -> Self {
        Self::with_clock(feeds, Arc::new(SystemClock))
    }

    pub fn with_clock(feeds: Vec<FeedKey>, clock: Arc<dyn Clock>) -> Self {
        Self { feeds, clock }
    }

    async fn scan(folder: &Path) -> Result<Vec<FileObservation>> {
        let mut entries = tokio::fs::read_dir(folder)
            .await
            .with_context(|| format!("Failed to read folder {:?}", folder))?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .with_context(|| format!("Failed to list folder {:?}", folder))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let metadata = entry
                .metadata()
                .await
                .with_context(|| format!("Failed to stat {:?}", entry.path()))?;
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata
                .modified()
                .with_context(|| format!("No modification time for {:?}", entry.path()))?;

            files.push(FileObservation {
                name,
                size_bytes: metadata.len(),
                arrival_timestamp: DateTime::<Utc>::from(modified),
            });
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }
}

#[async_trait]
impl SnapshotSource for FolderScanner {
    async fn feeds(&self) -> Vec<FeedKey> {
        self.feeds.clone()
    }

    async fn capture(&self, feed: &FeedKey) -> Result<FeedSnapshot> {
        let mut files = Self::scan(Path::new(&feed.folder)).await?;

        // stamped after listing so every mtime read precedes the capture
        let captured = self.clock.now();
        for file in files.iter_mut() {
            if file.arrival_timestamp > captured {
                debug!(feed = %feed, file = %file.name, "Clamping modification time to capture");
                file.arrival_timestamp = captured;
            }
        }

        Ok(FeedSnapshot {
            feed_key: feed.clone(),
            capture_timestamp: captured,
            files,
        })
    }
}
