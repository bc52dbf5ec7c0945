//! Feed monitoring daemon
//!
//! Exposes the daemon's configuration and HTTP API so they can be tested
//! without starting the binary.

pub mod api;
pub mod config;
