use super::hysteresis::{transition, Thresholds};
use crate::baseline::SignalOutcome;
use crate::models::{Alert, AlertState, FeedKey, MetricKind};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use tracing::debug;

/// Hysteresis state for every (feed, metric) pair
///
/// State is partitioned by feed. Only one evaluation per feed runs at a
/// time, so a feed's entry is never updated concurrently.
#[derive(Debug)]
pub struct AlertEngine {
    thresholds: Thresholds,
    states: DashMap<FeedKey, HashMap<MetricKind, AlertState>>,
}

impl AlertEngine {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            states: DashMap::new(),
        }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Apply this interval's outcomes for a feed, returning any transitions
    pub fn evaluate(
        &self,
        feed: &FeedKey,
        outcomes: &[SignalOutcome],
        now: DateTime<Utc>,
    ) -> Vec<Alert> {
        let mut alerts = Vec::new();
        let mut states = self.states.entry(feed.clone()).or_default();

        for outcome in outcomes {
            let kind = outcome.kind();
            let state = states.entry(kind).or_default();
            let (next, change) = transition(*state, outcome, &self.thresholds);
            *state = next;

            if let (Some(change), Some(signal)) = (change, outcome.signal()) {
                debug!(
                    feed = %feed,
                    metric = %kind,
                    from = %change.from,
                    to = %change.to,
                    "Alert level changed"
                );
                alerts.push(Alert {
                    feed_key: feed.clone(),
                    metric_kind: kind,
                    from_level: change.from,
                    to_level: change.to,
                    observed_value: signal.observed,
                    baseline_value: signal.baseline,
                    timestamp: now,
                });
            }
        }

        alerts
    }

    /// Current state; pairs never evaluated are OK with zero counters
    pub fn alert_state(&self, feed: &FeedKey, kind: MetricKind) -> AlertState {
        self.states
            .get(feed)
            .and_then(|s| s.get(&kind).copied())
            .unwrap_or_default()
    }

    /// Every metric's state for a feed
    pub fn states(&self, feed: &FeedKey) -> HashMap<MetricKind, AlertState> {
        self.states
            .get(feed)
            .map(|s| s.value().clone())
            .unwrap_or_default()
    }

    pub fn restore(&self, feed: &FeedKey, states: HashMap<MetricKind, AlertState>) {
        self.states.insert(feed.clone(), states);
    }

    pub fn feeds(&self) -> Vec<FeedKey> {
        self.states.iter().map(|e| e.key().clone()).collect()
    }
}

impl Default for AlertEngine {
    fn default() -> Self {
        Self::new(Thresholds::default())
    }
}
