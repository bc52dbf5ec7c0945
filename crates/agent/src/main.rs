//! feedwatch-agent - Vendor feed monitoring daemon
//!
//! Scans the configured feed folders every interval, maintains rolling
//! baselines and raises alerts when a feed drifts from its history.

use anyhow::{Context, Result};
use feedwatch_agent::{api, config::AgentConfig};
use feedwatch_lib::{
    health::HealthRegistry,
    observability::StructuredLogger,
    FolderScanner, MonitorEngine, SchedulerBuilder, StateFile, TracingSink,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting feedwatch-agent");

    let config = AgentConfig::load()?;
    info!(
        instance = %config.instance,
        feeds = config.feeds.len(),
        interval_secs = config.engine.interval_secs,
        "Agent configured"
    );

    let health_registry = HealthRegistry::with_unhealthy_after(config.unhealthy_after_ticks);
    health_registry.register_all().await;

    let logger = StructuredLogger::new(&config.instance);
    let engine = Arc::new(
        MonitorEngine::in_memory(config.engine.clone()).with_logger(logger.clone()),
    );

    // Resume from the last saved state before the first tick
    let state_file = config.state_path.clone().map(StateFile::new);
    if let Some(file) = &state_file {
        let loaded = file
            .load()
            .with_context(|| format!("Failed to load state from {:?}", file.path()))?;
        match loaded {
            Some(state) => {
                let records = state.record_count();
                engine
                    .restore_state(state)
                    .await
                    .context("Failed to restore engine state")?;
                info!(path = ?file.path(), records, "Engine state restored");
            }
            None => info!(path = ?file.path(), "No saved state, starting cold"),
        }
    }

    logger.log_startup(AGENT_VERSION, config.feeds.len());
    health_registry.set_ready(true);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let mut builder = SchedulerBuilder::new()
        .engine(engine.clone())
        .source(Arc::new(FolderScanner::new(config.feed_keys())))
        .sink(Arc::new(TracingSink::new(logger.clone())))
        .health(health_registry.clone());
    if let Some(file) = state_file {
        builder = builder.state_file(file);
    }
    let scheduler = builder.build()?;
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_tx.subscribe()));

    let app_state = Arc::new(api::AppState::new(engine, health_registry));
    let api_handle = tokio::spawn(api::serve(
        config.api_port,
        app_state,
        shutdown_tx.subscribe(),
    ));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    let _ = shutdown_tx.send(());

    // the scheduler saves state on its way out
    if let Err(e) = scheduler_handle.await {
        warn!(error = %e, "Scheduler task failed");
    }
    match api_handle.await {
        Ok(Err(e)) => warn!(error = %e, "API server exited with error"),
        Err(e) => warn!(error = %e, "API server task failed"),
        Ok(Ok(())) => {}
    }

    info!("Shutdown complete");
    Ok(())
}
