//! File size band validation
//!
//! The accepted band is derived from per-interval aggregates:
//! `lower = median(size_min) × (1 − tolerance)` and
//! `upper = median(size_max) × (1 + tolerance)`.

use super::{Assessment, Baseline, BaselineStatus, MetricSignal, SignalOutcome};
use crate::history::{median, median_absolute_deviation};
use crate::models::{FileObservation, HistoryRecord, MetricKind};
use serde::{Deserialize, Serialize};

/// Which side of the band a file fell on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeDirection {
    TooSmall,
    TooLarge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "direction", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SizeVerdict {
    InRange,
    OutOfRange(SizeDirection),
}

/// Classification of one arrived file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileClassification {
    pub name: String,
    pub size_bytes: u64,
    pub verdict: SizeVerdict,
}

struct SizeAggregates {
    median_min: f64,
    median_max: f64,
    median_mean: f64,
    spread: f64,
    samples: usize,
}

impl SizeAggregates {
    fn band(&self, tolerance: f64) -> (f64, f64) {
        let lower = self.median_min * (1.0 - tolerance);
        let upper = self.median_max * (1.0 + tolerance);
        (lower.max(0.0), upper)
    }
}

/// Classifies arrived files against the historical size band
pub struct SizeRangeValidator {
    pub tolerance: f64,
    pub min_history_intervals: usize,
}

impl SizeRangeValidator {
    pub fn new(tolerance: f64, min_history_intervals: usize) -> Self {
        Self {
            tolerance,
            min_history_intervals,
        }
    }

    pub fn baseline(&self, records: &[HistoryRecord]) -> BaselineStatus {
        let Some(aggregates) = self.aggregates(records) else {
            return BaselineStatus::Building {
                kind: MetricKind::SizeRange,
                intervals: records.len(),
                required: self.min_history_intervals,
            };
        };

        let (lower_bound, upper_bound) = aggregates.band(self.tolerance);
        BaselineStatus::Ready(Baseline {
            kind: MetricKind::SizeRange,
            median: aggregates.median_mean,
            spread: aggregates.spread,
            lower_bound,
            upper_bound,
            samples: aggregates.samples,
        })
    }

    /// Medians of the per-interval size aggregates, once history suffices
    fn aggregates(&self, records: &[HistoryRecord]) -> Option<SizeAggregates> {
        let mut mins = Vec::new();
        let mut maxes = Vec::new();
        let mut means = Vec::new();
        for m in records.iter().map(|r| &r.metrics) {
            if let (Some(min), Some(max), Some(mean)) = (m.size_min, m.size_max, m.mean_file_size())
            {
                mins.push(min as f64);
                maxes.push(max as f64);
                means.push(mean);
            }
        }

        if records.len() < self.min_history_intervals || means.is_empty() {
            return None;
        }

        Some(SizeAggregates {
            median_min: median(&mut mins)?,
            median_max: median(&mut maxes)?,
            spread: median_absolute_deviation(&means).unwrap_or(0.0),
            samples: means.len(),
            median_mean: median(&mut means)?,
        })
    }

    /// Classify each file; empty files are always too small
    pub fn classify<'a, I>(&self, files: I, baseline: &Baseline) -> Vec<FileClassification>
    where
        I: IntoIterator<Item = &'a FileObservation>,
    {
        files
            .into_iter()
            .map(|file| {
                let size = file.size_bytes as f64;
                let verdict = if file.size_bytes == 0 || size < baseline.lower_bound {
                    SizeVerdict::OutOfRange(SizeDirection::TooSmall)
                } else if size > baseline.upper_bound {
                    SizeVerdict::OutOfRange(SizeDirection::TooLarge)
                } else {
                    SizeVerdict::InRange
                };
                FileClassification {
                    name: file.name.clone(),
                    size_bytes: file.size_bytes,
                    verdict,
                }
            })
            .collect()
    }

    /// Classify the interval's arrivals and summarise them as one signal
    ///
    /// The signal reports the worst offending file against the bound it
    /// violated, or the mean size against the baseline median when every
    /// file is in range.
    pub fn assess(
        &self,
        arrivals: &[&FileObservation],
        records: &[HistoryRecord],
    ) -> (Vec<FileClassification>, SignalOutcome) {
        let status = self.baseline(records);
        if let Some(outcome) = SignalOutcome::from_status(&status) {
            return (Vec::new(), outcome);
        }
        let (Some(baseline), Some(aggregates)) = (status.ready(), self.aggregates(records)) else {
            return (Vec::new(), SignalOutcome::NoObservation { kind: MetricKind::SizeRange });
        };
        if arrivals.is_empty() {
            return (Vec::new(), SignalOutcome::NoObservation { kind: MetricKind::SizeRange });
        }

        let classifications = self.classify(arrivals.iter().copied(), baseline);
        let (severe_lower, severe_upper) = aggregates.band(self.tolerance * 2.0);

        let mut worst: Option<(f64, &FileClassification, f64)> = None;
        let mut severe = false;
        for c in &classifications {
            let size = c.size_bytes as f64;
            let (ratio, bound) = match c.verdict {
                SizeVerdict::InRange => continue,
                SizeVerdict::OutOfRange(SizeDirection::TooSmall) => {
                    severe |= c.size_bytes == 0 || size < severe_lower;
                    let ratio = if c.size_bytes == 0 {
                        f64::INFINITY
                    } else {
                        baseline.lower_bound / size
                    };
                    (ratio, baseline.lower_bound)
                }
                SizeVerdict::OutOfRange(SizeDirection::TooLarge) => {
                    severe |= size > severe_upper;
                    (size / baseline.upper_bound.max(f64::EPSILON), baseline.upper_bound)
                }
            };
            if worst.as_ref().map_or(true, |(r, _, _)| ratio > *r) {
                worst = Some((ratio, c, bound));
            }
        }

        let signal = match worst {
            Some((_, c, bound)) => MetricSignal {
                kind: MetricKind::SizeRange,
                observed: c.size_bytes as f64,
                baseline: bound,
                assessment: Assessment::Breach { severe },
            },
            None => {
                let total: u64 = arrivals.iter().map(|f| f.size_bytes).sum();
                MetricSignal {
                    kind: MetricKind::SizeRange,
                    observed: total as f64 / arrivals.len() as f64,
                    baseline: baseline.median,
                    assessment: Assessment::InBand,
                }
            }
        };

        (classifications, SignalOutcome::Evaluated(signal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetricsSnapshot;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn record(i: i64, min: u64, max: u64) -> HistoryRecord {
        HistoryRecord {
            recorded_at: at(i * 300),
            metrics: MetricsSnapshot {
                interval_start: at(i * 300 - 300),
                interval_end: at(i * 300),
                arrival_window: None,
                file_count: 2,
                size_min: Some(min),
                size_max: Some(max),
                size_sum: min + max,
                folder_size_bytes: 0,
                growth_bytes: None,
            },
        }
    }

    fn file(name: &str, size: u64) -> FileObservation {
        FileObservation {
            name: name.to_string(),
            size_bytes: size,
            arrival_timestamp: at(0) + Duration::seconds(1),
        }
    }

    fn history() -> Vec<HistoryRecord> {
        vec![
            record(1, 1000, 2000),
            record(2, 1100, 2100),
            record(3, 900, 1900),
        ]
    }

    #[test]
    fn test_cold_start_with_few_intervals() {
        let validator = SizeRangeValidator::new(0.5, 3);
        for n in 0..3 {
            let records: Vec<_> = history().into_iter().take(n).collect();
            let tiny = file("a.csv", 5);
            let (classified, outcome) = validator.assess(&[&tiny], &records);
            assert!(classified.is_empty());
            assert!(matches!(outcome, SignalOutcome::BaselineBuilding { .. }));
        }
    }

    #[test]
    fn test_bounds_from_medians() {
        let validator = SizeRangeValidator::new(0.5, 3);
        let status = validator.baseline(&history());
        let baseline = status.ready().unwrap();
        assert_eq!(baseline.lower_bound, 500.0);
        assert_eq!(baseline.upper_bound, 3000.0);
        assert_eq!(baseline.median, 1500.0);
        assert_eq!(baseline.samples, 3);
    }

    #[test]
    fn test_classification_directions() {
        let validator = SizeRangeValidator::new(0.5, 3);
        let status = validator.baseline(&history());
        let baseline = status.ready().unwrap();
        let files = vec![
            file("ok.csv", 1500),
            file("tiny.csv", 100),
            file("huge.csv", 4000),
            file("edge.csv", 500),
        ];

        let verdicts: Vec<_> = validator
            .classify(&files, baseline)
            .into_iter()
            .map(|c| c.verdict)
            .collect();
        assert_eq!(
            verdicts,
            vec![
                SizeVerdict::InRange,
                SizeVerdict::OutOfRange(SizeDirection::TooSmall),
                SizeVerdict::OutOfRange(SizeDirection::TooLarge),
                SizeVerdict::InRange,
            ]
        );
    }

    #[test]
    fn test_all_in_range_is_normal_signal() {
        let validator = SizeRangeValidator::new(0.5, 3);
        let a = file("a.csv", 1200);
        let b = file("b.csv", 1800);
        let (classified, outcome) = validator.assess(&[&a, &b], &history());

        assert_eq!(classified.len(), 2);
        let signal = outcome.signal().unwrap();
        assert!(signal.in_band());
        assert_eq!(signal.observed, 1500.0);
    }

    #[test]
    fn test_worst_offender_reported() {
        let validator = SizeRangeValidator::new(0.5, 3);
        let slightly_big = file("a.csv", 3500);
        let way_small = file("b.csv", 50);
        let (_, outcome) = validator.assess(&[&slightly_big, &way_small], &history());

        let signal = outcome.signal().unwrap();
        assert_eq!(signal.observed, 50.0);
        assert_eq!(signal.baseline, 500.0);
        // doubled band bottoms out at zero, so only empty files are severe on this side
        assert_eq!(signal.assessment, Assessment::Breach { severe: false });
    }

    #[test]
    fn test_mild_breach_not_severe() {
        let validator = SizeRangeValidator::new(0.5, 3);
        // upper 3000, doubled band upper 4000
        let big = file("a.csv", 3500);
        let (_, outcome) = validator.assess(&[&big], &history());
        assert_eq!(
            outcome.signal().unwrap().assessment,
            Assessment::Breach { severe: false }
        );

        let huge = file("b.csv", 4500);
        let (_, outcome) = validator.assess(&[&huge], &history());
        assert_eq!(
            outcome.signal().unwrap().assessment,
            Assessment::Breach { severe: true }
        );
    }

    #[test]
    fn test_zero_byte_file_is_severe() {
        let validator = SizeRangeValidator::new(1.0, 3);
        let empty = file("empty.csv", 0);
        let (classified, outcome) = validator.assess(&[&empty], &history());

        assert_eq!(
            classified[0].verdict,
            SizeVerdict::OutOfRange(SizeDirection::TooSmall)
        );
        assert_eq!(
            outcome.signal().unwrap().assessment,
            Assessment::Breach { severe: true }
        );
    }

    #[test]
    fn test_no_arrivals_is_neutral() {
        let validator = SizeRangeValidator::new(0.5, 3);
        let (_, outcome) = validator.assess(&[], &history());
        assert!(matches!(outcome, SignalOutcome::NoObservation { .. }));
    }
}
