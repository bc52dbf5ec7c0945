//! Observability infrastructure for the feed monitor
//!
//! Provides:
//! - Prometheus metrics (tick latency, feed evaluation latency, history size, alert volume)
//! - Structured JSON logging with tracing

use crate::models::{Alert, AlertLevel, FailureKind, FeedKey};
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0, 30.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<EngineMetricsInner> = OnceLock::new();

struct EngineMetricsInner {
    tick_latency_seconds: Histogram,
    feed_evaluation_latency_seconds: Histogram,
    feeds_monitored: IntGauge,
    history_records: IntGauge,
    alerts_emitted: IntCounterVec,
    ingestion_failures: IntCounterVec,
    missed_intervals: IntCounter,
}

impl EngineMetricsInner {
    fn new() -> Self {
        Self {
            tick_latency_seconds: register_histogram!(
                "feedwatch_tick_latency_seconds",
                "Time spent evaluating all feeds in one tick",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register tick_latency_seconds"),

            feed_evaluation_latency_seconds: register_histogram!(
                "feedwatch_feed_evaluation_latency_seconds",
                "Time spent evaluating a single feed snapshot",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register feed_evaluation_latency_seconds"),

            feeds_monitored: register_int_gauge!(
                "feedwatch_feeds_monitored",
                "Number of feeds with retained history"
            )
            .expect("Failed to register feeds_monitored"),

            history_records: register_int_gauge!(
                "feedwatch_history_records",
                "History records retained across all feeds"
            )
            .expect("Failed to register history_records"),

            alerts_emitted: register_int_counter_vec!(
                "feedwatch_alerts_emitted_total",
                "Alert level transitions emitted, by target level",
                &["level"]
            )
            .expect("Failed to register alerts_emitted"),

            ingestion_failures: register_int_counter_vec!(
                "feedwatch_ingestion_failures_total",
                "Feed evaluations skipped, by failure kind",
                &["kind"]
            )
            .expect("Failed to register ingestion_failures"),

            missed_intervals: register_int_counter!(
                "feedwatch_missed_intervals_total",
                "Ticks dropped because the previous tick was still running"
            )
            .expect("Failed to register missed_intervals"),
        }
    }
}

/// Engine metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct EngineMetrics {
    _private: (),
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &EngineMetricsInner {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new)
    }

    pub fn observe_tick_latency(&self, duration_secs: f64) {
        self.inner().tick_latency_seconds.observe(duration_secs);
    }

    pub fn observe_feed_latency(&self, duration_secs: f64) {
        self.inner()
            .feed_evaluation_latency_seconds
            .observe(duration_secs);
    }

    pub fn set_history_size(&self, feeds: i64, records: i64) {
        self.inner().feeds_monitored.set(feeds);
        self.inner().history_records.set(records);
    }

    pub fn inc_alerts(&self, level: AlertLevel) {
        self.inner()
            .alerts_emitted
            .with_label_values(&[&level.to_string()])
            .inc();
    }

    pub fn inc_ingestion_failures(&self, kind: FailureKind) {
        self.inner()
            .ingestion_failures
            .with_label_values(&[&kind.to_string()])
            .inc();
    }

    pub fn inc_missed_intervals(&self) {
        self.inner().missed_intervals.inc();
    }
}

/// Structured logger for engine events
///
/// Every line carries an `event` field so log pipelines can route on it.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, version: &str, feeds: usize) {
        info!(
            event = "engine_started",
            instance = %self.instance,
            version = %version,
            feeds = feeds,
            "Feed monitor started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "engine_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Feed monitor shutting down"
        );
    }

    /// Log an alert level transition
    pub fn log_alert(&self, alert: &Alert) {
        if alert.to_level == AlertLevel::Critical {
            warn!(
                event = "alert_transition",
                instance = %self.instance,
                feed = %alert.feed_key,
                metric = %alert.metric_kind,
                from_level = %alert.from_level,
                to_level = %alert.to_level,
                observed = alert.observed_value,
                baseline = alert.baseline_value,
                "Feed alert escalated to critical"
            );
        } else {
            info!(
                event = "alert_transition",
                instance = %self.instance,
                feed = %alert.feed_key,
                metric = %alert.metric_kind,
                from_level = %alert.from_level,
                to_level = %alert.to_level,
                observed = alert.observed_value,
                baseline = alert.baseline_value,
                "Feed alert level changed"
            );
        }
    }

    pub fn log_ingestion_failure(&self, feed: &FeedKey, kind: FailureKind, message: &str) {
        warn!(
            event = "ingestion_failure",
            instance = %self.instance,
            feed = %feed,
            kind = %kind,
            message = %message,
            "Feed evaluation skipped"
        );
    }

    pub fn log_missed_interval(&self, elapsed_secs: f64) {
        warn!(
            event = "missed_interval",
            instance = %self.instance,
            elapsed_secs = elapsed_secs,
            "Previous tick still running, interval dropped"
        );
    }

    pub fn log_tick(&self, feeds: usize, failures: usize, alerts: usize, duration_secs: f64) {
        info!(
            event = "tick_completed",
            instance = %self.instance,
            feeds = feeds,
            failures = failures,
            alerts = alerts,
            duration_secs = duration_secs,
            "Tick completed"
        );
    }
}
