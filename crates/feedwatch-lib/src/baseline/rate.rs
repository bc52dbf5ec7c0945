//! Arrival rate and folder growth tracking

use super::{assess_relative, relative_band, Baseline, BaselineStatus, MetricSignal, SignalOutcome};
use crate::history::{median, median_absolute_deviation, MetricSelector};
use crate::models::{HistoryRecord, MetricKind, MetricsSnapshot};

/// Compares per-second rates against their historical medians
pub struct RateTracker {
    pub tolerance: f64,
    pub min_history_intervals: usize,
}

impl RateTracker {
    pub const KINDS: [MetricKind; 2] = [MetricKind::ArrivalRate, MetricKind::FolderGrowth];

    pub fn new(tolerance: f64, min_history_intervals: usize) -> Self {
        Self {
            tolerance,
            min_history_intervals,
        }
    }

    fn selector(kind: MetricKind) -> Option<MetricSelector> {
        match kind {
            MetricKind::ArrivalRate => Some(MetricsSnapshot::arrival_rate),
            MetricKind::FolderGrowth => Some(MetricsSnapshot::growth_rate),
            _ => None,
        }
    }

    /// Median rate over retained history for `kind`
    ///
    /// Kinds other than arrival rate and folder growth never leave the
    /// building state here.
    pub fn baseline(&self, kind: MetricKind, records: &[HistoryRecord]) -> BaselineStatus {
        let mut samples: Vec<f64> = match Self::selector(kind) {
            Some(select) => records.iter().filter_map(|r| select(&r.metrics)).collect(),
            None => Vec::new(),
        };

        if records.len() < self.min_history_intervals || samples.is_empty() {
            return BaselineStatus::Building {
                kind,
                intervals: records.len(),
                required: self.min_history_intervals,
            };
        }

        let spread = median_absolute_deviation(&samples).unwrap_or(0.0);
        let count = samples.len();
        let center = median(&mut samples).unwrap_or(0.0);
        let (lower_bound, upper_bound) = relative_band(center, self.tolerance);

        BaselineStatus::Ready(Baseline {
            kind,
            median: center,
            spread,
            lower_bound,
            upper_bound,
            samples: count,
        })
    }

    fn assess_kind(
        &self,
        kind: MetricKind,
        current: &MetricsSnapshot,
        records: &[HistoryRecord],
    ) -> SignalOutcome {
        let status = self.baseline(kind, records);
        if let Some(outcome) = SignalOutcome::from_status(&status) {
            return outcome;
        }
        let observed = Self::selector(kind).and_then(|select| select(current));
        match (status.ready(), observed) {
            (Some(baseline), Some(observed)) => SignalOutcome::Evaluated(MetricSignal {
                kind,
                observed,
                baseline: baseline.median,
                assessment: assess_relative(observed, baseline.median, self.tolerance),
            }),
            _ => SignalOutcome::NoObservation { kind },
        }
    }

    /// Arrival rate and growth rate outcomes for the current interval
    pub fn assess(&self, current: &MetricsSnapshot, records: &[HistoryRecord]) -> Vec<SignalOutcome> {
        Self::KINDS
            .iter()
            .map(|kind| self.assess_kind(*kind, current, records))
            .collect()
    }
}
