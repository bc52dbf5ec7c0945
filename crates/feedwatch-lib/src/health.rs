//! Component health for the liveness and readiness endpoints
//!
//! The scheduler reports every tick's outcome per component. A failing
//! component is degraded; one that fails on `unhealthy_after` consecutive
//! ticks turns unhealthy and takes the daemon out of readiness until it
//! succeeds again.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Consecutive failing ticks before a component is unhealthy
pub const DEFAULT_UNHEALTHY_AFTER: u32 = 3;

/// Ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Failing, or partially failing, but not for long enough to matter
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Ticks in a row on which the component failed outright
    pub consecutive_failures: u32,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn healthy() -> Self {
        Self {
            status: ComponentStatus::Healthy,
            message: None,
            consecutive_failures: 0,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    fn with_problem(status: ComponentStatus, message: String, consecutive_failures: u32) -> Self {
        Self {
            status,
            message: Some(message),
            consecutive_failures,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Body of the liveness endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Worst status across components
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

/// Body of the readiness endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const SCHEDULER: &str = "scheduler";
    pub const HISTORY_STORE: &str = "history_store";
    pub const SNAPSHOT_SOURCE: &str = "snapshot_source";

    pub const ALL: [&str; 3] = [SCHEDULER, HISTORY_STORE, SNAPSHOT_SOURCE];
}

/// Shared view of component health, cheap to clone
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    components: Arc<RwLock<BTreeMap<String, ComponentHealth>>>,
    restored: Arc<AtomicBool>,
    unhealthy_after: u32,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::with_unhealthy_after(DEFAULT_UNHEALTHY_AFTER)
    }

    pub fn with_unhealthy_after(ticks: u32) -> Self {
        Self {
            components: Arc::new(RwLock::new(BTreeMap::new())),
            restored: Arc::new(AtomicBool::new(false)),
            unhealthy_after: ticks.max(1),
        }
    }

    /// Register every engine component as healthy
    pub async fn register_all(&self) {
        let mut components = self.components.write().await;
        for name in components::ALL {
            components.insert(name.to_string(), ComponentHealth::healthy());
        }
    }

    pub async fn component(&self, name: &str) -> Option<ComponentHealth> {
        self.components.read().await.get(name).cloned()
    }

    /// The component did its job this tick
    pub async fn report_ok(&self, name: &str) {
        let mut components = self.components.write().await;
        let previous = components.insert(name.to_string(), ComponentHealth::healthy());
        if previous.is_some_and(|p| p.status == ComponentStatus::Unhealthy) {
            info!(component = name, "Component recovered");
        }
    }

    /// The component partly failed this tick; its failure streak resets
    pub async fn report_degraded(&self, name: &str, message: impl Into<String>) {
        let health = ComponentHealth::with_problem(ComponentStatus::Degraded, message.into(), 0);
        self.components.write().await.insert(name.to_string(), health);
    }

    /// The component failed this tick; returns its resulting status
    pub async fn report_failure(&self, name: &str, message: impl Into<String>) -> ComponentStatus {
        let mut components = self.components.write().await;
        let streak = components
            .get(name)
            .map_or(0, |c| c.consecutive_failures)
            .saturating_add(1);
        let status = if streak >= self.unhealthy_after {
            ComponentStatus::Unhealthy
        } else {
            ComponentStatus::Degraded
        };
        let message = message.into();
        if status == ComponentStatus::Unhealthy && streak == self.unhealthy_after {
            warn!(
                component = name,
                consecutive_failures = streak,
                message = %message,
                "Component unhealthy"
            );
        }
        components.insert(
            name.to_string(),
            ComponentHealth::with_problem(status, message, streak),
        );
        status
    }

    /// Mark whether saved state has been loaded
    pub fn set_ready(&self, ready: bool) {
        self.restored.store(ready, Ordering::SeqCst);
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let status = components
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy);
        HealthResponse { status, components }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        if !self.restored.load(Ordering::SeqCst) {
            return ReadinessResponse {
                ready: false,
                reason: Some("State not yet restored".to_string()),
            };
        }

        let components = self.components.read().await;
        let unhealthy = components
            .iter()
            .find(|(_, c)| c.status == ComponentStatus::Unhealthy);
        match unhealthy {
            Some((name, c)) => ReadinessResponse {
                ready: false,
                reason: Some(format!(
                    "{} failed {} ticks in a row: {}",
                    name,
                    c.consecutive_failures,
                    c.message.as_deref().unwrap_or("no detail")
                )),
            },
            None => ReadinessResponse {
                ready: true,
                reason: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_not_ready_until_state_restored() {
        let registry = HealthRegistry::new();
        registry.register_all().await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Healthy);
        assert_eq!(health.components.len(), components::ALL.len());

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("State not yet restored"));

        registry.set_ready(true);
        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_empty_registry_is_healthy() {
        let registry = HealthRegistry::new();
        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_failure_streak_turns_unhealthy() {
        let registry = HealthRegistry::with_unhealthy_after(3);
        registry.register_all().await;
        registry.set_ready(true);

        for expected in [ComponentStatus::Degraded, ComponentStatus::Degraded] {
            let status = registry
                .report_failure(components::HISTORY_STORE, "disk offline")
                .await;
            assert_eq!(status, expected);
            assert!(registry.readiness().await.ready);
        }

        let status = registry
            .report_failure(components::HISTORY_STORE, "disk offline")
            .await;
        assert_eq!(status, ComponentStatus::Unhealthy);
        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(
            readiness.reason.as_deref(),
            Some("history_store failed 3 ticks in a row: disk offline")
        );
    }

    #[tokio::test]
    async fn test_success_resets_streak() {
        let registry = HealthRegistry::with_unhealthy_after(2);
        registry.register_all().await;
        registry.set_ready(true);

        registry.report_failure(components::SCHEDULER, "state not saved").await;
        registry.report_ok(components::SCHEDULER).await;
        let status = registry
            .report_failure(components::SCHEDULER, "state not saved")
            .await;
        assert_eq!(status, ComponentStatus::Degraded);

        registry.report_failure(components::SCHEDULER, "state not saved").await;
        assert!(!registry.readiness().await.ready);

        registry.report_ok(components::SCHEDULER).await;
        let scheduler = registry.component(components::SCHEDULER).await.unwrap();
        assert_eq!(scheduler.consecutive_failures, 0);
        assert!(scheduler.message.is_none());
        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_partial_failure_degrades_without_streak() {
        let registry = HealthRegistry::with_unhealthy_after(1);
        registry.register_all().await;
        registry.set_ready(true);

        for _ in 0..5 {
            registry
                .report_degraded(components::SNAPSHOT_SOURCE, "1 of 4 feeds could not be captured")
                .await;
        }

        let source = registry.component(components::SNAPSHOT_SOURCE).await.unwrap();
        assert_eq!(source.status, ComponentStatus::Degraded);
        assert_eq!(source.consecutive_failures, 0);
        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);
        assert!(registry.readiness().await.ready);
    }
}
