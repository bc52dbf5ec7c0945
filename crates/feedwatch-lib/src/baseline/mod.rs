//! Baselines and anomaly signals
//!
//! This module provides:
//! - Arrival window derivation and first-arrival-of-day baselines
//! - File size band validation
//! - Arrival rate and folder growth tracking
//!
//! Calculators only say whether a value is anomalous. Whether that
//! warrants an alert is decided by the hysteresis in [`crate::alert`].

mod rate;
mod size_range;
mod window;

pub use rate::RateTracker;
pub use size_range::{FileClassification, SizeDirection, SizeRangeValidator, SizeVerdict};
pub use window::{seconds_of_day, WindowCalculator, SECONDS_PER_DAY};

use crate::models::MetricKind;
use serde::{Deserialize, Serialize};

/// Expected-value reference computed from retained history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub kind: MetricKind,
    pub median: f64,
    /// Median absolute deviation of the samples
    pub spread: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub samples: usize,
}

/// A baseline, or the cold-start status while history accumulates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BaselineStatus {
    #[serde(rename = "baseline_building")]
    Building {
        kind: MetricKind,
        intervals: usize,
        required: usize,
    },
    Ready(Baseline),
}

impl BaselineStatus {
    pub fn ready(&self) -> Option<&Baseline> {
        match self {
            BaselineStatus::Ready(b) => Some(b),
            BaselineStatus::Building { .. } => None,
        }
    }

    pub fn is_building(&self) -> bool {
        matches!(self, BaselineStatus::Building { .. })
    }
}

/// Position of an observation relative to its baseline band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Assessment {
    InBand,
    /// Outside the band; `severe` when also outside the doubled band
    Breach { severe: bool },
}

/// An evaluated observation for one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSignal {
    pub kind: MetricKind,
    pub observed: f64,
    pub baseline: f64,
    pub assessment: Assessment,
}

impl MetricSignal {
    pub fn in_band(&self) -> bool {
        self.assessment == Assessment::InBand
    }
}

/// What a calculator concluded for one metric this interval
///
/// Only `Evaluated` moves alert counters; the other variants are neutral.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SignalOutcome {
    BaselineBuilding {
        kind: MetricKind,
        intervals: usize,
        required: usize,
    },
    NoObservation {
        kind: MetricKind,
    },
    Evaluated(MetricSignal),
}

impl SignalOutcome {
    pub fn kind(&self) -> MetricKind {
        match self {
            SignalOutcome::BaselineBuilding { kind, .. } | SignalOutcome::NoObservation { kind } => {
                *kind
            }
            SignalOutcome::Evaluated(signal) => signal.kind,
        }
    }

    pub fn signal(&self) -> Option<&MetricSignal> {
        match self {
            SignalOutcome::Evaluated(signal) => Some(signal),
            _ => None,
        }
    }

    fn from_status(status: &BaselineStatus) -> Option<Self> {
        match status {
            BaselineStatus::Building {
                kind,
                intervals,
                required,
            } => Some(SignalOutcome::BaselineBuilding {
                kind: *kind,
                intervals: *intervals,
                required: *required,
            }),
            BaselineStatus::Ready(_) => None,
        }
    }
}

/// Band `[median × (1 − t), median × (1 + t)]`, ordered for negative medians
pub(crate) fn relative_band(median: f64, tolerance: f64) -> (f64, f64) {
    let a = median * (1.0 - tolerance);
    let b = median * (1.0 + tolerance);
    (a.min(b), a.max(b))
}

/// Classify `observed` against the relative band and its doubled variant
pub(crate) fn assess_relative(observed: f64, median: f64, tolerance: f64) -> Assessment {
    let (lo, hi) = relative_band(median, tolerance);
    if (lo..=hi).contains(&observed) {
        return Assessment::InBand;
    }
    let (severe_lo, severe_hi) = relative_band(median, tolerance * 2.0);
    Assessment::Breach {
        severe: !(severe_lo..=severe_hi).contains(&observed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_band_orders_negative_median() {
        assert_eq!(relative_band(100.0, 0.5), (50.0, 150.0));
        assert_eq!(relative_band(-100.0, 0.5), (-150.0, -50.0));
    }

    #[test]
    fn test_assess_relative() {
        assert_eq!(assess_relative(120.0, 100.0, 0.5), Assessment::InBand);
        assert_eq!(
            assess_relative(160.0, 100.0, 0.5),
            Assessment::Breach { severe: false }
        );
        assert_eq!(
            assess_relative(201.0, 100.0, 0.5),
            Assessment::Breach { severe: true }
        );
        // zero median leaves no room at all
        assert_eq!(
            assess_relative(0.1, 0.0, 0.5),
            Assessment::Breach { severe: true }
        );
    }

    #[test]
    fn test_building_status_serializes_with_tag() {
        let status = BaselineStatus::Building {
            kind: MetricKind::ArrivalRate,
            intervals: 2,
            required: 3,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "baseline_building");
        assert_eq!(json["kind"], "ARRIVAL_RATE");
    }
}
