//! Error taxonomy for feed evaluation

use crate::models::{FailureKind, FeedKey};
use chrono::{DateTime, Utc};

/// Failures of the history backing storage
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("history store unavailable: {0}")]
    Unavailable(String),
}

/// Reasons a feed's tick is skipped
///
/// None of these are fatal: the failure is confined to one feed and
/// surfaced as an ingestion failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EvaluationError {
    #[error("malformed snapshot for {feed}: {reason}")]
    MalformedSnapshot { feed: FeedKey, reason: String },

    #[error("clock skew for {feed}: captured at {captured}, previous capture {previous}")]
    ClockSkew {
        feed: FeedKey,
        previous: DateTime<Utc>,
        captured: DateTime<Utc>,
    },

    #[error("history store failed for {feed}: {source}")]
    Store {
        feed: FeedKey,
        #[source]
        source: StoreError,
    },

    #[error("evaluation for {feed} still in flight, interval dropped")]
    Overrun { feed: FeedKey },
}

impl EvaluationError {
    pub fn feed(&self) -> &FeedKey {
        match self {
            EvaluationError::MalformedSnapshot { feed, .. }
            | EvaluationError::ClockSkew { feed, .. }
            | EvaluationError::Store { feed, .. }
            | EvaluationError::Overrun { feed } => feed,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            EvaluationError::MalformedSnapshot { .. } => FailureKind::MalformedSnapshot,
            EvaluationError::ClockSkew { .. } => FailureKind::ClockSkew,
            EvaluationError::Store { .. } => FailureKind::StoreUnavailable,
            EvaluationError::Overrun { .. } => FailureKind::MissedInterval,
        }
    }
}
