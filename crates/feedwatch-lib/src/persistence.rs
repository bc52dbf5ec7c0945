//! Engine state persistence
//!
//! The saved state holds, per feed, the retained history, the alert state of
//! every metric and the sequencing cursor. Restoring it yields the same
//! baselines and alert levels as an uninterrupted run.

use crate::models::{AlertState, FeedKey, HistoryRecord, MetricKind, MetricsSnapshot};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Current on-disk format version
pub const STATE_VERSION: u32 = 1;

/// Where a feed left off: used to sequence and difference the next snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedCursor {
    pub last_capture: Option<DateTime<Utc>>,
    pub last_folder_size: Option<u64>,
    /// Latest file arrival seen so far
    pub last_arrival: Option<DateTime<Utc>>,
    /// Metrics of the most recent successful evaluation
    pub current: Option<MetricsSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedState {
    pub feed_key: FeedKey,
    pub records: Vec<HistoryRecord>,
    #[serde(default)]
    pub alert_states: HashMap<MetricKind, AlertState>,
    #[serde(default)]
    pub cursor: FeedCursor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub feeds: Vec<FeedState>,
}

impl EngineState {
    pub fn new(saved_at: DateTime<Utc>, mut feeds: Vec<FeedState>) -> Self {
        feeds.sort_by(|a, b| a.feed_key.cmp(&b.feed_key));
        Self {
            version: STATE_VERSION,
            saved_at,
            feeds,
        }
    }

    pub fn record_count(&self) -> usize {
        self.feeds.iter().map(|f| f.records.len()).sum()
    }
}

/// JSON state file written atomically
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write via a temp file and rename so a crash never leaves a torn file
    pub fn save(&self, state: &EngineState) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }

        let json = serde_json::to_vec(state).context("Failed to serialize engine state")?;

        let temp_path = self.path.with_extension("tmp");
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .with_context(|| format!("Failed to create temp file {:?}", temp_path))?;

        file.write_all(&json).context("Failed to write engine state")?;
        file.sync_all().context("Failed to sync state file")?;

        std::fs::rename(&temp_path, &self.path)
            .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, self.path))?;

        debug!(
            path = %self.path.display(),
            feeds = state.feeds.len(),
            records = state.record_count(),
            "Engine state saved"
        );
        Ok(())
    }

    /// Load saved state; `None` when no state has been written yet
    pub fn load(&self) -> Result<Option<EngineState>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let mut file = File::open(&self.path)
            .with_context(|| format!("Failed to open state file {:?}", self.path))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .context("Failed to read state file")?;

        let state: EngineState =
            serde_json::from_slice(&data).context("Failed to deserialize engine state")?;
        if state.version != STATE_VERSION {
            bail!(
                "Unsupported state version {} in {:?} (expected {})",
                state.version,
                self.path,
                STATE_VERSION
            );
        }

        info!(
            path = %self.path.display(),
            feeds = state.feeds.len(),
            records = state.record_count(),
            "Loaded engine state"
        );
        Ok(Some(state))
    }
}
