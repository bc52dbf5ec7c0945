//! Arrival window derivation
//!
//! Computes the observed arrival window for an interval and compares a
//! feed's first arrival of each delivery against the median first-arrival
//! time of previous days. All time-of-day math wraps at midnight.

use super::{Assessment, Baseline, BaselineStatus, MetricSignal, SignalOutcome};
use crate::history::{median, median_absolute_deviation};
use crate::models::{ArrivalWindow, FileObservation, HistoryRecord, MetricKind, MetricsSnapshot};
use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use std::collections::BTreeMap;

pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Seconds elapsed since UTC midnight
pub fn seconds_of_day(ts: DateTime<Utc>) -> f64 {
    ts.num_seconds_from_midnight() as f64
}

/// Distance between two times of day, wrapping at midnight
fn circular_distance(a: f64, b: f64) -> f64 {
    let d = (a - b).abs() % SECONDS_PER_DAY;
    d.min(SECONDS_PER_DAY - d)
}

/// Median and median absolute deviation of times of day
///
/// Samples are unwrapped at the widest gap between neighbours (the one
/// across midnight included), so a cluster straddling midnight keeps its
/// center there.
fn circular_median(samples: &[f64]) -> Option<(f64, f64)> {
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let (first, last) = (*sorted.first()?, *sorted.last()?);

    let mut cut = 0;
    let mut widest = first + SECONDS_PER_DAY - last;
    for (i, pair) in sorted.windows(2).enumerate() {
        let gap = pair[1] - pair[0];
        if gap > widest {
            widest = gap;
            cut = i + 1;
        }
    }

    let mut unwrapped: Vec<f64> = sorted[cut..]
        .iter()
        .copied()
        .chain(sorted[..cut].iter().map(|s| s + SECONDS_PER_DAY))
        .collect();
    let spread = median_absolute_deviation(&unwrapped)?;
    let center = median(&mut unwrapped)?.rem_euclid(SECONDS_PER_DAY);
    Some((center, spread))
}

/// Latest instant at or before `ts` whose time of day is `secs`
fn previous_occurrence(ts: DateTime<Utc>, secs: f64) -> DateTime<Utc> {
    let back = (seconds_of_day(ts) - secs).rem_euclid(SECONDS_PER_DAY);
    ts - secs_duration(back)
}

/// Instant closest to `ts` whose time of day is `secs`
fn nearest_occurrence(ts: DateTime<Utc>, secs: f64) -> DateTime<Utc> {
    let previous = previous_occurrence(ts, secs);
    let next = previous + Duration::days(1);
    if ts - previous <= next - ts {
        previous
    } else {
        next
    }
}

fn secs_duration(secs: f64) -> Duration {
    Duration::milliseconds((secs * 1000.0).round() as i64)
}

/// Derives arrival windows and the first-arrival-time baseline
pub struct WindowCalculator {
    /// Allowed distance from the median first-arrival time, in seconds
    pub tolerance_secs: f64,
    pub min_history_intervals: usize,
}

impl WindowCalculator {
    pub fn new(tolerance_secs: f64, min_history_intervals: usize) -> Self {
        Self {
            tolerance_secs,
            min_history_intervals,
        }
    }

    /// Earliest and latest arrival over `files`; `None` when empty
    pub fn window<'a, I>(files: I) -> Option<ArrivalWindow>
    where
        I: IntoIterator<Item = &'a FileObservation>,
    {
        files.into_iter().fold(None, |acc, file| {
            let ts = file.arrival_timestamp;
            Some(match acc {
                None => ArrivalWindow {
                    earliest: ts,
                    latest: ts,
                },
                Some(w) => ArrivalWindow {
                    earliest: w.earliest.min(ts),
                    latest: w.latest.max(ts),
                },
            })
        })
    }

    /// Files that arrived in `(start, end]`
    pub fn arrivals_in(
        files: &[FileObservation],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<&FileObservation> {
        files
            .iter()
            .filter(|f| f.arrival_timestamp > start && f.arrival_timestamp <= end)
            .collect()
    }

    /// First arrival of each UTC day seen in history
    fn first_arrivals(records: &[HistoryRecord]) -> BTreeMap<NaiveDate, DateTime<Utc>> {
        let mut days: BTreeMap<NaiveDate, DateTime<Utc>> = BTreeMap::new();
        for window in records.iter().filter_map(|r| r.metrics.arrival_window) {
            let day = window.earliest.date_naive();
            days.entry(day)
                .and_modify(|first| *first = (*first).min(window.earliest))
                .or_insert(window.earliest);
        }
        days
    }

    /// Median first-arrival time of day over days before `today`
    pub fn baseline(&self, records: &[HistoryRecord], today: NaiveDate) -> BaselineStatus {
        let samples: Vec<f64> = Self::first_arrivals(records)
            .into_iter()
            .filter(|(day, _)| *day < today)
            .map(|(_, first)| seconds_of_day(first))
            .collect();

        if records.len() < self.min_history_intervals || samples.is_empty() {
            return BaselineStatus::Building {
                kind: MetricKind::ArrivalWindow,
                intervals: records.len(),
                required: self.min_history_intervals,
            };
        }

        let (center, spread) = circular_median(&samples).unwrap_or((0.0, 0.0));

        // bounds are times of day; lower exceeds upper when the band spans midnight
        BaselineStatus::Ready(Baseline {
            kind: MetricKind::ArrivalWindow,
            median: center,
            spread,
            lower_bound: (center - self.tolerance_secs).rem_euclid(SECONDS_PER_DAY),
            upper_bound: (center + self.tolerance_secs).rem_euclid(SECONDS_PER_DAY),
            samples: samples.len(),
        })
    }

    /// Judge this interval's arrivals, or their absence
    ///
    /// `last_arrival` is the latest arrival seen before this interval. An
    /// arrival opens a delivery unless something already arrived within
    /// tolerance of the expected time nearest to it; the opening arrival is
    /// scored against the baseline and later ones in the same delivery
    /// clear. An empty interval breaches once the expected time has passed
    /// by more than the tolerance with nothing delivered for it.
    pub fn assess(
        &self,
        current: &MetricsSnapshot,
        records: &[HistoryRecord],
        last_arrival: Option<DateTime<Utc>>,
    ) -> SignalOutcome {
        let today = current.interval_end.date_naive();
        let status = self.baseline(records, today);
        if let Some(outcome) = SignalOutcome::from_status(&status) {
            return outcome;
        }
        let Some(baseline) = status.ready() else {
            return SignalOutcome::NoObservation {
                kind: MetricKind::ArrivalWindow,
            };
        };

        let tolerance = secs_duration(self.tolerance_secs);
        let delivered_for =
            |expected: DateTime<Utc>| last_arrival.is_some_and(|t| t >= expected - tolerance);

        match current.arrival_window {
            Some(window) => {
                let observed = seconds_of_day(window.earliest);
                let expected = nearest_occurrence(window.earliest, baseline.median);
                let assessment = if delivered_for(expected) {
                    Assessment::InBand
                } else {
                    self.classify_distance(circular_distance(observed, baseline.median))
                };
                SignalOutcome::Evaluated(MetricSignal {
                    kind: MetricKind::ArrivalWindow,
                    observed,
                    baseline: baseline.median,
                    assessment,
                })
            }
            None => {
                let now = current.interval_end;
                let expected = previous_occurrence(now, baseline.median);
                let overdue = (now - expected).num_milliseconds() as f64 / 1000.0;
                if !delivered_for(expected) && overdue > self.tolerance_secs {
                    SignalOutcome::Evaluated(MetricSignal {
                        kind: MetricKind::ArrivalWindow,
                        observed: seconds_of_day(now),
                        baseline: baseline.median,
                        assessment: self.classify_distance(overdue),
                    })
                } else {
                    SignalOutcome::NoObservation {
                        kind: MetricKind::ArrivalWindow,
                    }
                }
            }
        }
    }

    fn classify_distance(&self, distance: f64) -> Assessment {
        if distance <= self.tolerance_secs {
            Assessment::InBand
        } else {
            Assessment::Breach {
                severe: distance > self.tolerance_secs * 2.0,
            }
        }
    }
}
