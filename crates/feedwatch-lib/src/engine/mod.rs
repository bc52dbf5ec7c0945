//! Per-feed evaluation pipeline and tick fan-out
//!
//! Each feed is a partition: its cursor sits behind its own mutex, and a
//! snapshot is only evaluated while that mutex is held. Distinct feeds run
//! in parallel within a tick; a feed whose previous evaluation is still in
//! flight has its new snapshot dropped as a missed interval.
//!
//! Readers never take the partition mutex. Each successful evaluation
//! publishes a copy of the cursor, and the read interface and state export
//! work from those copies.

use crate::alert::{AlertEngine, Thresholds};
use crate::baseline::{
    BaselineStatus, FileClassification, RateTracker, SignalOutcome, SizeRangeValidator,
    WindowCalculator,
};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{EvaluationError, StoreError};
use crate::history::{HistoryStore, InMemoryHistoryStore};
use crate::models::{
    Alert, AlertState, FailureKind, FeedKey, FeedSnapshot, HistoryRecord, IngestionFailure,
    MetricKind, MetricsSnapshot,
};
use crate::observability::{EngineMetrics, StructuredLogger};
use crate::persistence::{EngineState, FeedCursor, FeedState};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// Result of one successful feed evaluation
#[derive(Debug, Clone)]
pub struct FeedEvaluation {
    pub feed_key: FeedKey,
    pub metrics: MetricsSnapshot,
    pub outcomes: Vec<SignalOutcome>,
    pub classifications: Vec<FileClassification>,
    pub alerts: Vec<Alert>,
}

/// Summary of one tick across all feeds
#[derive(Debug, Default)]
pub struct TickReport {
    pub evaluated: Vec<FeedKey>,
    pub alerts: Vec<Alert>,
    pub failures: Vec<IngestionFailure>,
    /// Records dropped by the retention sweep over feeds not evaluated this tick
    pub purged: usize,
}

impl TickReport {
    pub fn has_store_failures(&self) -> bool {
        self.failures
            .iter()
            .any(|f| f.kind == FailureKind::StoreUnavailable)
    }
}

/// Feed monitoring engine
pub struct MonitorEngine {
    config: EngineConfig,
    history: Arc<dyn HistoryStore>,
    alerts: AlertEngine,
    windows: WindowCalculator,
    sizes: SizeRangeValidator,
    rates: RateTracker,
    partitions: DashMap<FeedKey, Arc<Mutex<FeedCursor>>>,
    /// Cursor as of each feed's last successful evaluation
    published: DashMap<FeedKey, FeedCursor>,
    failures: DashMap<FeedKey, IngestionFailure>,
    clock: Arc<dyn Clock>,
    metrics: EngineMetrics,
    logger: StructuredLogger,
}

impl MonitorEngine {
    pub fn new(config: EngineConfig, history: Arc<dyn HistoryStore>, clock: Arc<dyn Clock>) -> Self {
        let min = config.min_history_intervals;
        Self {
            alerts: AlertEngine::new(Thresholds::from(&config)),
            windows: WindowCalculator::new(config.arrival_tolerance_secs(), min),
            sizes: SizeRangeValidator::new(config.tolerance, min),
            rates: RateTracker::new(config.tolerance, min),
            config,
            history,
            partitions: DashMap::new(),
            published: DashMap::new(),
            failures: DashMap::new(),
            clock,
            metrics: EngineMetrics::new(),
            logger: StructuredLogger::new("feedwatch"),
        }
    }

    /// Engine over an in-memory store and the system clock
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(
            config,
            Arc::new(InMemoryHistoryStore::new()),
            Arc::new(SystemClock),
        )
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    fn partition(&self, feed: &FeedKey) -> Arc<Mutex<FeedCursor>> {
        self.partitions.entry(feed.clone()).or_default().clone()
    }

    fn retention_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.config.retention()
    }

    /// Evaluate one snapshot for its feed
    ///
    /// Fails with [`EvaluationError::Overrun`] instead of waiting when the
    /// feed already has an evaluation in flight.
    pub async fn evaluate_feed(
        &self,
        snapshot: FeedSnapshot,
    ) -> Result<FeedEvaluation, EvaluationError> {
        let feed = snapshot.feed_key.clone();
        let partition = self.partition(&feed);
        let Ok(mut cursor) = partition.try_lock_owned() else {
            let err = EvaluationError::Overrun { feed };
            self.record_failure(&err);
            return Err(err);
        };

        // failures recorded while this evaluation runs must survive its success
        let prior_failure = self.ingestion_failure(&feed);

        let started = Instant::now();
        let result = self.evaluate_locked(&mut cursor, snapshot).await;
        self.metrics
            .observe_feed_latency(started.elapsed().as_secs_f64());

        match &result {
            Ok(evaluation) => {
                self.failures
                    .remove_if(&feed, |_, failure| Some(failure) == prior_failure.as_ref());
                for alert in &evaluation.alerts {
                    self.metrics.inc_alerts(alert.to_level);
                }
            }
            Err(err) => self.record_failure(err),
        }
        result
    }

    async fn evaluate_locked(
        &self,
        cursor: &mut FeedCursor,
        snapshot: FeedSnapshot,
    ) -> Result<FeedEvaluation, EvaluationError> {
        let now = self.clock.now();
        validate(&snapshot, cursor, now)?;

        let feed = snapshot.feed_key.clone();
        let store_err = |source: StoreError| EvaluationError::Store {
            feed: feed.clone(),
            source,
        };

        self.history
            .purge_older_than(&feed, self.retention_cutoff(now))
            .await
            .map_err(store_err)?;
        let records = self.history.records(&feed).await.map_err(store_err)?;

        let interval = ChronoDuration::seconds(self.config.interval_secs as i64);
        let metrics = derive_metrics(&snapshot, cursor, interval);
        let arrivals =
            WindowCalculator::arrivals_in(&snapshot.files, metrics.interval_start, metrics.interval_end);

        let mut outcomes = Vec::with_capacity(MetricKind::ALL.len());
        outcomes.push(self.windows.assess(&metrics, &records, cursor.last_arrival));
        let (classifications, size_outcome) = self.sizes.assess(&arrivals, &records);
        if matches!(size_outcome, SignalOutcome::BaselineBuilding { .. }) {
            for empty in arrivals.iter().filter(|f| f.size_bytes == 0) {
                warn!(
                    feed = %feed,
                    file = %empty.name,
                    "Zero-byte file arrived while size baseline is building"
                );
            }
        }
        outcomes.push(size_outcome);
        outcomes.extend(self.rates.assess(&metrics, &records));

        // no record means no alert evaluation either
        self.history
            .append(&feed, metrics.clone(), now)
            .await
            .map_err(store_err)?;

        let alerts = self.alerts.evaluate(&feed, &outcomes, now);

        cursor.last_capture = Some(snapshot.capture_timestamp);
        cursor.last_folder_size = Some(metrics.folder_size_bytes);
        if let Some(window) = metrics.arrival_window {
            cursor.last_arrival = Some(cursor.last_arrival.map_or(window.latest, |t| t.max(window.latest)));
        }
        cursor.current = Some(metrics.clone());
        self.published.insert(feed.clone(), cursor.clone());

        debug!(
            feed = %feed,
            files = metrics.file_count,
            folder_size_bytes = metrics.folder_size_bytes,
            history = records.len() + 1,
            alerts = alerts.len(),
            "Feed evaluated"
        );

        Ok(FeedEvaluation {
            feed_key: feed,
            metrics,
            outcomes,
            classifications,
            alerts,
        })
    }

    fn record_failure(&self, err: &EvaluationError) {
        let feed = err.feed().clone();
        let kind = err.kind();
        let message = err.to_string();
        let consecutive = self
            .failures
            .get(&feed)
            .map(|f| f.consecutive.saturating_add(1))
            .unwrap_or(1);

        self.metrics.inc_ingestion_failures(kind);
        self.logger.log_ingestion_failure(&feed, kind, &message);
        self.failures.insert(
            feed.clone(),
            IngestionFailure {
                feed_key: feed,
                kind,
                message,
                timestamp: self.clock.now(),
                consecutive,
            },
        );
    }

    /// Evaluate one tick's snapshots, one task per feed
    ///
    /// Snapshots for the same feed are evaluated in capture order within a
    /// single task. After all tasks finish, feeds with history that did not
    /// complete an evaluation are still purged to the retention bound.
    pub async fn run_tick(self: &Arc<Self>, snapshots: Vec<FeedSnapshot>) -> TickReport {
        let started = Instant::now();
        let mut report = TickReport::default();

        let mut batches: BTreeMap<FeedKey, Vec<FeedSnapshot>> = BTreeMap::new();
        for snapshot in snapshots {
            batches
                .entry(snapshot.feed_key.clone())
                .or_default()
                .push(snapshot);
        }

        let mut tasks = JoinSet::new();
        for (_, mut batch) in batches {
            batch.sort_by_key(|s| s.capture_timestamp);
            let engine = Arc::clone(self);
            tasks.spawn(async move {
                let mut results = Vec::with_capacity(batch.len());
                for snapshot in batch {
                    results.push(engine.evaluate_feed(snapshot).await);
                }
                results
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(results) => {
                    for result in results {
                        match result {
                            Ok(evaluation) => {
                                report.evaluated.push(evaluation.feed_key);
                                report.alerts.extend(evaluation.alerts);
                            }
                            Err(err) => {
                                if let Some(failure) = self.failures.get(err.feed()) {
                                    report.failures.push(failure.clone());
                                }
                            }
                        }
                    }
                }
                Err(e) => error!(error = %e, "Feed evaluation task failed"),
            }
        }

        report.purged = self.sweep_retention(&report.evaluated).await;
        report.evaluated.sort();
        report.evaluated.dedup();

        let feeds = self.history.feeds().await.len();
        let records = self.history.record_count().await;
        self.metrics.set_history_size(feeds as i64, records as i64);

        let elapsed = started.elapsed().as_secs_f64();
        self.metrics.observe_tick_latency(elapsed);
        self.logger.log_tick(
            report.evaluated.len(),
            report.failures.len(),
            report.alerts.len(),
            elapsed,
        );
        report
    }

    /// Purge every feed with history that was not just evaluated
    async fn sweep_retention(&self, evaluated: &[FeedKey]) -> usize {
        let cutoff = self.retention_cutoff(self.clock.now());
        let mut purged = 0;
        for feed in self.history.feeds().await {
            if evaluated.contains(&feed) {
                continue;
            }
            match self.history.purge_older_than(&feed, cutoff).await {
                Ok(removed) => purged += removed,
                Err(e) => warn!(feed = %feed, error = %e, "Retention sweep failed"),
            }
        }
        purged
    }

    /// Metrics from the feed's most recent successful evaluation
    pub fn current_metrics(&self, feed: &FeedKey) -> Option<MetricsSnapshot> {
        self.published.get(feed).and_then(|c| c.current.clone())
    }

    /// Baseline for one metric over the currently retained history
    pub async fn baseline(
        &self,
        feed: &FeedKey,
        kind: MetricKind,
    ) -> Result<BaselineStatus, StoreError> {
        let now = self.clock.now();
        let records = self.retained_records(feed, now).await?;
        Ok(match kind {
            MetricKind::ArrivalWindow => self.windows.baseline(&records, now.date_naive()),
            MetricKind::SizeRange => self.sizes.baseline(&records),
            MetricKind::ArrivalRate | MetricKind::FolderGrowth => {
                self.rates.baseline(kind, &records)
            }
        })
    }

    /// Records inside the retention window as of `now`, without purging
    async fn retained_records(
        &self,
        feed: &FeedKey,
        now: DateTime<Utc>,
    ) -> Result<Vec<HistoryRecord>, StoreError> {
        let cutoff = self.retention_cutoff(now);
        let mut records = self.history.records(feed).await?;
        records.retain(|r| r.recorded_at >= cutoff);
        Ok(records)
    }

    pub fn alert_state(&self, feed: &FeedKey, kind: MetricKind) -> AlertState {
        self.alerts.alert_state(feed, kind)
    }

    /// Alert state of every metric, including those never evaluated
    pub fn alert_states(&self, feed: &FeedKey) -> BTreeMap<MetricKind, AlertState> {
        MetricKind::ALL
            .iter()
            .map(|kind| (*kind, self.alerts.alert_state(feed, *kind)))
            .collect()
    }

    pub fn ingestion_failure(&self, feed: &FeedKey) -> Option<IngestionFailure> {
        self.failures.get(feed).map(|f| f.clone())
    }

    /// Latest unresolved ingestion failure per feed
    pub fn ingestion_failures(&self) -> Vec<IngestionFailure> {
        let mut failures: Vec<_> = self.failures.iter().map(|f| f.value().clone()).collect();
        failures.sort_by(|a, b| a.feed_key.cmp(&b.feed_key));
        failures
    }

    /// Every feed the engine knows about
    pub async fn feeds(&self) -> Vec<FeedKey> {
        let mut feeds: BTreeSet<FeedKey> = self.history.feeds().await.into_iter().collect();
        feeds.extend(self.partitions.iter().map(|p| p.key().clone()));
        feeds.extend(self.alerts.feeds());
        feeds.into_iter().collect()
    }

    /// Snapshot of everything needed to resume after a restart
    pub async fn export_state(&self) -> Result<EngineState, StoreError> {
        let mut feeds = Vec::new();
        for feed in self.feeds().await {
            let cursor = self
                .published
                .get(&feed)
                .map(|c| c.clone())
                .unwrap_or_default();
            let records = self.history.records(&feed).await?;
            feeds.push(FeedState {
                alert_states: self.alerts.states(&feed),
                feed_key: feed,
                records,
                cursor,
            });
        }
        Ok(EngineState::new(self.clock.now(), feeds))
    }

    /// Load saved state, replacing whatever the engine holds for those feeds
    pub async fn restore_state(&self, state: EngineState) -> Result<(), StoreError> {
        for feed_state in state.feeds {
            let FeedState {
                feed_key,
                records,
                alert_states,
                cursor,
            } = feed_state;
            self.history.restore(&feed_key, records).await?;
            self.alerts.restore(&feed_key, alert_states);
            self.published.insert(feed_key.clone(), cursor.clone());
            self.partitions
                .insert(feed_key, Arc::new(Mutex::new(cursor)));
        }
        Ok(())
    }
}

/// Reject snapshots that cannot be sequenced or contain impossible data
fn validate(
    snapshot: &FeedSnapshot,
    cursor: &FeedCursor,
    now: DateTime<Utc>,
) -> Result<(), EvaluationError> {
    let feed = &snapshot.feed_key;
    let malformed = |reason: String| EvaluationError::MalformedSnapshot {
        feed: feed.clone(),
        reason,
    };

    if snapshot.capture_timestamp > now {
        return Err(malformed(format!(
            "capture timestamp {} is in the future",
            snapshot.capture_timestamp
        )));
    }
    if let Some(previous) = cursor.last_capture {
        if snapshot.capture_timestamp < previous {
            return Err(EvaluationError::ClockSkew {
                feed: feed.clone(),
                previous,
                captured: snapshot.capture_timestamp,
            });
        }
    }
    for file in &snapshot.files {
        if file.name.is_empty() {
            return Err(malformed("file with empty name".to_string()));
        }
        if file.arrival_timestamp.timestamp() < 0 || file.arrival_timestamp > now {
            return Err(malformed(format!(
                "file {} arrived at {}, outside [epoch, now]",
                file.name, file.arrival_timestamp
            )));
        }
    }
    Ok(())
}

/// Metrics for the interval ending at the snapshot's capture
///
/// The interval starts at the previous capture; the first snapshot of a
/// feed, or one sharing the previous capture instant, gets a nominal
/// interval of the configured length.
fn derive_metrics(
    snapshot: &FeedSnapshot,
    cursor: &FeedCursor,
    interval: ChronoDuration,
) -> MetricsSnapshot {
    let end = snapshot.capture_timestamp;
    let start = match cursor.last_capture {
        Some(previous) if previous < end => previous,
        _ => end - interval,
    };

    let arrivals = WindowCalculator::arrivals_in(&snapshot.files, start, end);
    let folder_size_bytes = snapshot.folder_size_bytes();

    MetricsSnapshot {
        interval_start: start,
        interval_end: end,
        arrival_window: WindowCalculator::window(arrivals.iter().copied()),
        file_count: arrivals.len() as u64,
        size_min: arrivals.iter().map(|f| f.size_bytes).min(),
        size_max: arrivals.iter().map(|f| f.size_bytes).max(),
        size_sum: arrivals.iter().map(|f| f.size_bytes).sum(),
        folder_size_bytes,
        growth_bytes: cursor
            .last_folder_size
            .map(|previous| folder_size_bytes as i64 - previous as i64),
    }
}
