use crate::baseline::{Assessment, SignalOutcome};
use crate::config::EngineConfig;
use crate::models::{AlertLevel, AlertState};

/// Consecutive-run lengths that move an alert between levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Breaches before OK escalates to WARNING
    pub escalate: u32,
    /// Breaches before WARNING escalates to CRITICAL
    pub critical: u32,
    /// Clears before any level returns to OK
    pub deescalate: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for Thresholds {
    fn from(config: &EngineConfig) -> Self {
        Self {
            escalate: config.escalate_threshold,
            critical: config.critical_threshold,
            deescalate: config.deescalate_threshold,
        }
    }
}

/// Level change produced by one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: AlertLevel,
    pub to: AlertLevel,
}

/// Advance one (feed, metric) state by a single outcome
///
/// Building and absent outcomes leave the state untouched. The level moves
/// at most one step per call; CRITICAL is reached either by a run of
/// severe breaches as long as the escalation run, or by a plain breach run
/// of `critical` length.
pub fn transition(
    state: AlertState,
    outcome: &SignalOutcome,
    thresholds: &Thresholds,
) -> (AlertState, Option<Transition>) {
    let Some(signal) = outcome.signal() else {
        return (state, None);
    };

    let mut next = state;
    match signal.assessment {
        Assessment::Breach { severe } => {
            next.consecutive_breaches = next.consecutive_breaches.saturating_add(1);
            next.consecutive_clears = 0;
            next.consecutive_severe = if severe {
                next.consecutive_severe.saturating_add(1)
            } else {
                0
            };

            next.level = match state.level {
                AlertLevel::Ok if next.consecutive_breaches >= thresholds.escalate => {
                    AlertLevel::Warning
                }
                AlertLevel::Warning
                    if next.consecutive_severe >= thresholds.escalate
                        || next.consecutive_breaches >= thresholds.critical =>
                {
                    AlertLevel::Critical
                }
                level => level,
            };
        }
        Assessment::InBand => {
            next.consecutive_clears = next.consecutive_clears.saturating_add(1);
            next.consecutive_breaches = 0;
            next.consecutive_severe = 0;

            if state.level != AlertLevel::Ok && next.consecutive_clears >= thresholds.deescalate {
                next.level = AlertLevel::Ok;
            }
        }
    }

    let change = (next.level != state.level).then_some(Transition {
        from: state.level,
        to: next.level,
    });
    (next, change)
}
