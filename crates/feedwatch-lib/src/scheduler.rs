//! Fixed-interval tick loop
//!
//! Each tick captures every feed from the snapshot source, runs the
//! engine, hands alerts to the sinks and saves state. Ticks never overlap:
//! a tick that overruns the period causes the missed periods to be skipped
//! and logged.

use crate::engine::{MonitorEngine, TickReport};
use crate::health::{components, HealthRegistry};
use crate::models::FeedSnapshot;
use crate::observability::EngineMetrics;
use crate::persistence::StateFile;
use crate::sink::AlertSink;
use crate::source::SnapshotSource;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Drives the engine once per interval
pub struct Scheduler {
    engine: Arc<MonitorEngine>,
    source: Arc<dyn SnapshotSource>,
    sinks: Vec<Arc<dyn AlertSink>>,
    health: HealthRegistry,
    state_file: Option<StateFile>,
    interval: Duration,
    metrics: EngineMetrics,
}

impl Scheduler {
    /// Run until a shutdown signal arrives, then save state one last time
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.interval.as_secs(),
            sinks = self.sinks.len(),
            "Starting feed evaluation loop"
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let started = Instant::now();
                    self.tick_once().await;
                    self.check_overrun(started.elapsed());
                }
                _ = shutdown.recv() => {
                    info!("Shutting down feed evaluation loop");
                    break;
                }
            }
        }

        if let Err(e) = self.persist().await {
            warn!(error = %e, "Failed to save engine state on shutdown");
        }
    }

    fn check_overrun(&self, elapsed: Duration) {
        if elapsed <= self.interval {
            return;
        }
        let missed = (elapsed.as_secs_f64() / self.interval.as_secs_f64()).floor() as u64;
        for _ in 0..missed {
            self.metrics.inc_missed_intervals();
        }
        self.engine
            .logger()
            .log_missed_interval(elapsed.as_secs_f64());
    }

    /// Capture, evaluate, deliver and persist one tick
    pub async fn tick_once(&self) -> TickReport {
        let snapshots = self.capture_all().await;
        let report = self.engine.run_tick(snapshots).await;

        if !report.alerts.is_empty() {
            for sink in &self.sinks {
                if let Err(e) = sink.deliver(&report.alerts).await {
                    warn!(error = %e, alerts = report.alerts.len(), "Alert delivery failed");
                }
            }
        }

        if report.has_store_failures() {
            self.health
                .report_failure(components::HISTORY_STORE, "History store unavailable")
                .await;
        } else {
            self.health.report_ok(components::HISTORY_STORE).await;
        }

        match self.persist().await {
            Ok(()) => self.health.report_ok(components::SCHEDULER).await,
            Err(e) => {
                warn!(error = %e, "Failed to save engine state");
                self.health
                    .report_failure(components::SCHEDULER, format!("State not saved: {:#}", e))
                    .await;
            }
        }

        report
    }

    async fn capture_all(&self) -> Vec<FeedSnapshot> {
        let feeds = self.source.feeds().await;
        let mut snapshots = Vec::with_capacity(feeds.len());
        let mut failed = 0usize;

        for feed in &feeds {
            match self.source.capture(feed).await {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => {
                    failed += 1;
                    warn!(feed = %feed, error = %e, "Failed to capture feed snapshot");
                }
            }
        }

        let message = format!("{} of {} feeds could not be captured", failed, feeds.len());
        if failed == 0 {
            self.health.report_ok(components::SNAPSHOT_SOURCE).await;
        } else if failed == feeds.len() {
            self.health
                .report_failure(components::SNAPSHOT_SOURCE, message)
                .await;
        } else {
            self.health
                .report_degraded(components::SNAPSHOT_SOURCE, message)
                .await;
        }

        debug!(captured = snapshots.len(), failed, "Snapshots captured");
        snapshots
    }

    /// Save engine state when a state file is configured
    pub async fn persist(&self) -> Result<()> {
        let Some(file) = self.state_file.clone() else {
            return Ok(());
        };
        let state = self
            .engine
            .export_state()
            .await
            .context("Failed to export engine state")?;
        tokio::task::spawn_blocking(move || file.save(&state))
            .await
            .context("State save task failed")?
    }
}

/// Builder for the scheduler
pub struct SchedulerBuilder {
    engine: Option<Arc<MonitorEngine>>,
    source: Option<Arc<dyn SnapshotSource>>,
    sinks: Vec<Arc<dyn AlertSink>>,
    health: Option<HealthRegistry>,
    state_file: Option<StateFile>,
    interval: Option<Duration>,
}

impl SchedulerBuilder {
    pub fn new() -> Self {
        Self {
            engine: None,
            source: None,
            sinks: Vec::new(),
            health: None,
            state_file: None,
            interval: None,
        }
    }

    pub fn engine(mut self, engine: Arc<MonitorEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn source(mut self, source: Arc<dyn SnapshotSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Add an alert sink; may be called repeatedly
    pub fn sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn state_file(mut self, file: StateFile) -> Self {
        self.state_file = Some(file);
        self
    }

    /// Override the tick period (defaults to the engine's configured interval)
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn build(self) -> Result<Scheduler> {
        let engine = self
            .engine
            .ok_or_else(|| anyhow::anyhow!("Engine is required"))?;
        let source = self
            .source
            .ok_or_else(|| anyhow::anyhow!("Snapshot source is required"))?;
        let interval = self.interval.unwrap_or_else(|| engine.config().interval());
        if interval.is_zero() {
            anyhow::bail!("Tick interval must be positive");
        }

        Ok(Scheduler {
            engine,
            source,
            sinks: self.sinks,
            health: self.health.unwrap_or_default(),
            state_file: self.state_file,
            interval,
            metrics: EngineMetrics::new(),
        })
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
