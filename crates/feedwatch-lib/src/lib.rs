//! Feed monitoring engine
//!
//! This crate provides the core functionality for:
//! - Per-feed metrics derived from folder snapshots
//! - Rolling baselines over a bounded history
//! - Hysteresis-based alerting
//! - Fixed-interval scheduling, persistence and health checks

pub mod alert;
pub mod baseline;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod health;
pub mod history;
pub mod models;
pub mod observability;
pub mod persistence;
pub mod scheduler;
pub mod sink;
pub mod source;

pub use baseline::{Baseline, BaselineStatus, FileClassification, SignalOutcome};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use engine::{FeedEvaluation, MonitorEngine, TickReport};
pub use error::{EvaluationError, StoreError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use history::{HistoryStore, InMemoryHistoryStore};
pub use models::*;
pub use observability::{EngineMetrics, StructuredLogger};
pub use persistence::{EngineState, StateFile};
pub use scheduler::{Scheduler, SchedulerBuilder};
pub use sink::{AlertSink, ChannelSink, TracingSink};
pub use source::{FolderScanner, SnapshotSource};
