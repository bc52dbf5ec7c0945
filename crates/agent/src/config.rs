//! Daemon configuration

use anyhow::{ensure, Context, Result};
use feedwatch_lib::{health::DEFAULT_UNHEALTHY_AFTER, EngineConfig, FeedKey};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "FEEDWATCH_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "feedwatch.toml";

/// One monitored vendor folder
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeedConfig {
    pub vendor: String,
    pub folder: String,
}

impl FeedConfig {
    pub fn key(&self) -> FeedKey {
        FeedKey::new(&self.vendor, &self.folder)
    }
}

/// Daemon configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Instance name used in structured logs
    #[serde(default = "default_instance")]
    pub instance: String,

    /// API server port for health, metrics and the read interface
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Engine state file; state is kept in memory only when unset
    #[serde(default)]
    pub state_path: Option<PathBuf>,

    /// Consecutive failing ticks before a component fails readiness
    #[serde(default = "default_unhealthy_after_ticks")]
    pub unhealthy_after_ticks: u32,

    /// Folders to monitor
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,

    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_instance() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "feedwatch".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_unhealthy_after_ticks() -> u32 {
    DEFAULT_UNHEALTHY_AFTER
}

impl AgentConfig {
    /// Load from the config file (if present) overlaid with `FEEDWATCH__*` env vars
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(&path)
    }

    pub fn load_from(path: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("FEEDWATCH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        let config: AgentConfig = config
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        ensure!(
            self.unhealthy_after_ticks > 0,
            "unhealthy_after_ticks must be positive"
        );

        let mut seen = HashSet::new();
        for feed in &self.feeds {
            ensure!(!feed.vendor.is_empty(), "feed vendor must not be empty");
            ensure!(!feed.folder.is_empty(), "feed folder must not be empty");
            ensure!(
                seen.insert(feed.key()),
                "feed {} is configured twice",
                feed.key()
            );
        }
        Ok(())
    }

    pub fn feed_keys(&self) -> Vec<FeedKey> {
        self.feeds.iter().map(FeedConfig::key).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_from_file() {
        let file = write_config(
            r#"
api_port = 9100
state_path = "/var/lib/feedwatch/state.json"

[[feeds]]
vendor = "acme"
folder = "/data/in/acme"

[[feeds]]
vendor = "globex"
folder = "/data/in/globex"

[engine]
tolerance = 0.3
escalate_threshold = 3
"#,
        );

        let config = AgentConfig::load_from(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.api_port, 9100);
        assert_eq!(
            config.state_path,
            Some(PathBuf::from("/var/lib/feedwatch/state.json"))
        );
        assert_eq!(config.feeds.len(), 2);
        assert_eq!(config.feed_keys()[0], FeedKey::new("acme", "/data/in/acme"));
        assert_eq!(config.engine.tolerance, 0.3);
        assert_eq!(config.engine.escalate_threshold, 3);
        assert_eq!(config.engine.interval_secs, 300);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = AgentConfig::load_from("/nonexistent/feedwatch").unwrap();
        assert_eq!(config.api_port, 8080);
        assert!(config.feeds.is_empty());
        assert!(config.state_path.is_none());
        assert_eq!(config.unhealthy_after_ticks, DEFAULT_UNHEALTHY_AFTER);
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn test_duplicate_feed_rejected() {
        let file = write_config(
            r#"
[[feeds]]
vendor = "acme"
folder = "/data/in/acme"

[[feeds]]
vendor = "acme"
folder = "/data/in/acme"
"#,
        );
        let err = AgentConfig::load_from(file.path().to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("configured twice"));
    }

    #[test]
    fn test_zero_unhealthy_threshold_rejected() {
        let file = write_config("unhealthy_after_ticks = 0\n");
        let err = AgentConfig::load_from(file.path().to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("unhealthy_after_ticks"));
    }

    #[test]
    fn test_invalid_engine_section_rejected() {
        let file = write_config(
            r#"
[engine]
escalate_threshold = 5
critical_threshold = 2
"#,
        );
        assert!(AgentConfig::load_from(file.path().to_str().unwrap()).is_err());
    }
}
