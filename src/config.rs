//! Coordinator configuration
//!
//! Loaded from a JSON file; every field except `data_dir` has a default.
//!
//! ```json
//! { "data_dir": "/var/lib/lra", "max_attempts": 5, "default_lra_timeout_ms": 600000 }
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coordinator::{CoordinatorSettings, RetryPolicy};
use crate::registry::DEFAULT_SETTLED_CAPACITY;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Result type for configuration
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Directory holding the record store
    pub data_dir: PathBuf,

    /// Timeout of one participant call (default: 5000)
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    /// Attempts per participant before it fails (default: 10)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First retry delay (default: 1000)
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Retry delay cap (default: 60000)
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Parallel participant calls per LRA (default: 8)
    #[serde(default = "default_max_concurrent_notifications")]
    pub max_concurrent_notifications: usize,

    /// Recovery sweep period (default: 10000)
    #[serde(default = "default_recovery_interval_ms")]
    pub recovery_interval_ms: u64,

    /// How long shutdown waits for in-flight fan-outs (default: 5000)
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// Timeout applied to LRAs started without one (default: none)
    #[serde(default)]
    pub default_lra_timeout_ms: Option<u64>,

    /// Finished LRAs kept in memory for status queries (default: 1024)
    #[serde(default = "default_settled_cache_size")]
    pub settled_cache_size: usize,
}

fn default_call_timeout_ms() -> u64 {
    5_000
}

fn default_max_attempts() -> u32 {
    10
}

fn default_initial_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

fn default_max_concurrent_notifications() -> usize {
    8
}

fn default_recovery_interval_ms() -> u64 {
    10_000
}

fn default_shutdown_grace_ms() -> u64 {
    5_000
}

fn default_settled_cache_size() -> usize {
    DEFAULT_SETTLED_CAPACITY
}

impl CoordinatorConfig {
    /// Default configuration over `data_dir`
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            call_timeout_ms: default_call_timeout_ms(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_concurrent_notifications: default_max_concurrent_notifications(),
            recovery_interval_ms: default_recovery_interval_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            default_lra_timeout_ms: None,
            settled_cache_size: default_settled_cache_size(),
        }
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the coordinator cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("data_dir must be set".into()));
        }
        if self.call_timeout_ms == 0 {
            return Err(ConfigError::Invalid("call_timeout_ms must be positive".into()));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".into()));
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(ConfigError::Invalid(format!(
                "max_backoff_ms ({}) is below initial_backoff_ms ({})",
                self.max_backoff_ms, self.initial_backoff_ms
            )));
        }
        if self.max_concurrent_notifications == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_notifications must be at least 1".into(),
            ));
        }
        if self.recovery_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "recovery_interval_ms must be positive".into(),
            ));
        }
        if self.settled_cache_size == 0 {
            return Err(ConfigError::Invalid(
                "settled_cache_size must be at least 1".into(),
            ));
        }
        if self.default_lra_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "default_lra_timeout_ms must be positive when set".into(),
            ));
        }
        Ok(())
    }

    /// Retry policy described by this config
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }

    /// Coordinator tuning described by this config
    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            retry: self.retry_policy(),
            call_timeout: self.call_timeout(),
            max_concurrent_notifications: self.max_concurrent_notifications,
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn recovery_interval(&self) -> Duration {
        Duration::from_millis(self.recovery_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn default_lra_timeout(&self) -> Option<Duration> {
        self.default_lra_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("coordinator.json");
        fs::write(&path, r#"{"data_dir": "/tmp/lra", "max_attempts": 3}"#).unwrap();

        let config = CoordinatorConfig::load(&path).unwrap();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.call_timeout_ms, 5_000);
        assert_eq!(config.max_backoff_ms, 60_000);
        assert_eq!(config.max_concurrent_notifications, 8);
        assert_eq!(config.default_lra_timeout(), None);
        assert_eq!(config.settled_cache_size, 1024);
        assert_eq!(config.retry_policy().max_attempts(), 3);
    }

    #[test]
    fn test_missing_file_and_bad_json() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing.json");
        assert!(matches!(
            CoordinatorConfig::load(&missing),
            Err(ConfigError::Read { .. })
        ));

        let bad = temp_dir.path().join("bad.json");
        fs::write(&bad, "{ data_dir: ").unwrap();
        assert!(matches!(
            CoordinatorConfig::load(&bad),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_validation() {
        let mut config = CoordinatorConfig::new("/tmp/lra");
        assert!(config.validate().is_ok());

        config.max_backoff_ms = 10;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = CoordinatorConfig::new("/tmp/lra");
        config.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = CoordinatorConfig::new("/tmp/lra");
        config.default_lra_timeout_ms = Some(0);
        assert!(config.validate().is_err());
    }
}
