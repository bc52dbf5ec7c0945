//! Subcommand implementations

pub mod feed;
pub mod feeds;
