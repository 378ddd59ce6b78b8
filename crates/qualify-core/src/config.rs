//! Configuration parsing.
//!
//! The daemon and the CLI read one TOML file describing the store, the
//! worker loop, the dispatcher wait and ranking defaults. Every field has a
//! default, so an empty file is a valid configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::DEFAULT_CUT_LIMIT;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualifyConfig {
    /// Store settings.
    #[serde(default)]
    pub store: StoreSection,

    /// Background worker settings.
    #[serde(default)]
    pub worker: WorkerSection,

    /// Dispatcher wait settings.
    #[serde(default)]
    pub dispatcher: DispatcherSection,

    /// Ranking defaults.
    #[serde(default)]
    pub ranking: RankingSection,
}

impl QualifyConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or a value is out of range.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "worker.name must not be empty".to_string(),
            ));
        }
        if self.worker.poll_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "worker.poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.dispatcher.initial_backoff_ms == 0 {
            return Err(ConfigError::Validation(
                "dispatcher.initial_backoff_ms must be positive".to_string(),
            ));
        }
        if self.ranking.default_cut_limit == 0 {
            return Err(ConfigError::Validation(
                "ranking.default_cut_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSection {
    /// Path to the `SQLite` database.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("qualify.db")
}

/// Background worker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSection {
    /// Name under which the checkpoint is stored.
    #[serde(default = "default_worker_name")]
    pub name: String,

    /// Scan interval when no wake signal arrives.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Stop after this many seconds; run until shutdown when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_for_secs: Option<u64>,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            name: default_worker_name(),
            poll_interval_ms: default_poll_interval_ms(),
            run_for_secs: None,
        }
    }
}

fn default_worker_name() -> String {
    "championship-mutations".to_string()
}

const fn default_poll_interval_ms() -> u64 {
    1000
}

/// Dispatcher wait configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherSection {
    /// First backoff interval; each following interval doubles.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Total wait budget.
    #[serde(default = "default_max_total_wait_ms")]
    pub max_total_wait_ms: u64,
}

impl Default for DispatcherSection {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_total_wait_ms: default_max_total_wait_ms(),
        }
    }
}

const fn default_initial_backoff_ms() -> u64 {
    200
}

const fn default_max_total_wait_ms() -> u64 {
    3000
}

/// Ranking defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingSection {
    /// Cut limit of classes without a stored limit.
    #[serde(default = "default_cut_limit")]
    pub default_cut_limit: u32,
}

impl Default for RankingSection {
    fn default() -> Self {
        Self {
            default_cut_limit: default_cut_limit(),
        }
    }
}

const fn default_cut_limit() -> u32 {
    DEFAULT_CUT_LIMIT
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading configuration file.
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = QualifyConfig::from_toml("").unwrap();
        assert_eq!(config, QualifyConfig::default());
        assert_eq!(config.store.path, PathBuf::from("qualify.db"));
        assert_eq!(config.worker.poll_interval_ms, 1000);
        assert_eq!(config.worker.run_for_secs, None);
        assert_eq!(config.dispatcher.initial_backoff_ms, 200);
        assert_eq!(config.dispatcher.max_total_wait_ms, 3000);
        assert_eq!(config.ranking.default_cut_limit, 24);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [store]
            path = "/var/lib/qualify/qualify.db"

            [worker]
            name = "regional"
            poll_interval_ms = 250
            run_for_secs = 3600

            [dispatcher]
            initial_backoff_ms = 100
            max_total_wait_ms = 1500

            [ranking]
            default_cut_limit = 16
        "#;

        let config = QualifyConfig::from_toml(toml).unwrap();
        assert_eq!(config.store.path, PathBuf::from("/var/lib/qualify/qualify.db"));
        assert_eq!(config.worker.name, "regional");
        assert_eq!(config.worker.poll_interval_ms, 250);
        assert_eq!(config.worker.run_for_secs, Some(3600));
        assert_eq!(config.dispatcher.initial_backoff_ms, 100);
        assert_eq!(config.dispatcher.max_total_wait_ms, 1500);
        assert_eq!(config.ranking.default_cut_limit, 16);
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        for toml in [
            "[worker]\npoll_interval_ms = 0",
            "[worker]\nname = \" \"",
            "[dispatcher]\ninitial_backoff_ms = 0",
            "[ranking]\ndefault_cut_limit = 0",
        ] {
            assert!(
                matches!(QualifyConfig::from_toml(toml), Err(ConfigError::Validation(_))),
                "accepted: {toml}"
            );
        }
    }

    #[test]
    fn test_malformed_toml() {
        assert!(matches!(
            QualifyConfig::from_toml("[worker\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_round_trip_through_toml() {
        let mut config = QualifyConfig::default();
        config.worker.run_for_secs = Some(60);
        let text = config.to_toml().unwrap();
        assert_eq!(QualifyConfig::from_toml(&text).unwrap(), config);
    }
}
