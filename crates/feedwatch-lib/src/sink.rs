//! Alert delivery
//!
//! Sinks receive each tick's alerts once; delivery is best effort.

use crate::models::Alert;
use crate::observability::StructuredLogger;
use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, alerts: &[Alert]) -> Result<()>;
}

/// Writes alerts to the structured log
#[derive(Clone)]
pub struct TracingSink {
    logger: StructuredLogger,
}

impl TracingSink {
    pub fn new(logger: StructuredLogger) -> Self {
        Self { logger }
    }
}

#[async_trait]
impl AlertSink for TracingSink {
    async fn deliver(&self, alerts: &[Alert]) -> Result<()> {
        for alert in alerts {
            self.logger.log_alert(alert);
        }
        Ok(())
    }
}

/// Forwards alerts to an in-process consumer
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Alert>,
}

impl ChannelSink {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<Alert>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl AlertSink for ChannelSink {
    async fn deliver(&self, alerts: &[Alert]) -> Result<()> {
        for alert in alerts {
            self.tx
                .send(alert.clone())
                .await
                .context("Alert receiver dropped")?;
        }
        Ok(())
    }
}
