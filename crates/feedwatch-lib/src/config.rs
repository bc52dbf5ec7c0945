//! Engine tuning parameters

use anyhow::{ensure, Result};
use chrono::Duration as ChronoDuration;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default evaluation interval (5 minutes)
pub const DEFAULT_INTERVAL_SECS: u64 = 5 * 60;

/// Default history retention (15 days)
pub const DEFAULT_RETENTION_DAYS: u32 = 15;

/// Configuration for baselines and alert hysteresis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Tick period in seconds
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Days of history retained per feed
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Retained intervals required before a baseline is trusted
    #[serde(default = "default_min_history_intervals")]
    pub min_history_intervals: usize,

    /// Relative band around size and rate baselines
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// Minutes either side of the median first-arrival time
    #[serde(default = "default_arrival_tolerance_mins")]
    pub arrival_tolerance_mins: u32,

    /// Consecutive breaches before OK escalates to WARNING
    #[serde(default = "default_escalate_threshold")]
    pub escalate_threshold: u32,

    /// Consecutive breaches before WARNING escalates to CRITICAL
    #[serde(default = "default_critical_threshold")]
    pub critical_threshold: u32,

    /// Consecutive clears before returning to OK
    #[serde(default = "default_deescalate_threshold")]
    pub deescalate_threshold: u32,
}

fn default_interval_secs() -> u64 {
    DEFAULT_INTERVAL_SECS
}

fn default_retention_days() -> u32 {
    DEFAULT_RETENTION_DAYS
}

fn default_min_history_intervals() -> usize {
    // three days of 5-minute ticks
    3 * 24 * 12
}

fn default_tolerance() -> f64 {
    0.5
}

fn default_arrival_tolerance_mins() -> u32 {
    10
}

fn default_escalate_threshold() -> u32 {
    2
}

fn default_critical_threshold() -> u32 {
    6
}

fn default_deescalate_threshold() -> u32 {
    2
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            retention_days: default_retention_days(),
            min_history_intervals: default_min_history_intervals(),
            tolerance: default_tolerance(),
            arrival_tolerance_mins: default_arrival_tolerance_mins(),
            escalate_threshold: default_escalate_threshold(),
            critical_threshold: default_critical_threshold(),
            deescalate_threshold: default_deescalate_threshold(),
        }
    }
}

impl EngineConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn retention(&self) -> ChronoDuration {
        ChronoDuration::days(self.retention_days as i64)
    }

    pub fn arrival_tolerance_secs(&self) -> f64 {
        self.arrival_tolerance_mins as f64 * 60.0
    }

    /// Reject settings the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        ensure!(self.interval_secs > 0, "interval_secs must be positive");
        ensure!(self.retention_days > 0, "retention_days must be positive");
        ensure!(
            self.tolerance.is_finite() && self.tolerance >= 0.0,
            "tolerance must be a non-negative number, got {}",
            self.tolerance
        );
        ensure!(self.escalate_threshold > 0, "escalate_threshold must be positive");
        ensure!(
            self.deescalate_threshold > 0,
            "deescalate_threshold must be positive"
        );
        ensure!(
            self.critical_threshold >= self.escalate_threshold,
            "critical_threshold ({}) must not be below escalate_threshold ({})",
            self.critical_threshold,
            self.escalate_threshold
        );
        Ok(())
    }
}
