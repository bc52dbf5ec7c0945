//! Alert hysteresis
//!
//! Turns per-interval signals into edge-triggered level transitions:
//! - [`transition`] is the pure state machine for one (feed, metric) pair
//! - [`AlertEngine`] owns the state for every pair and emits [`Alert`]s

mod engine;
mod hysteresis;

pub use engine::AlertEngine;
pub use hysteresis::{transition, Thresholds, Transition};
