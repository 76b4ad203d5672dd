//! TOML configuration.
//!
//! Every field has a default, so an empty file (or no file) is valid.
//!
//! ```toml
//! [engine]
//! auto_start = true
//!
//! [executor]
//! success_probability = 0.9
//! min_delay_ms = 500
//! max_delay_ms = 2000
//!
//! [store]
//! data_dir = "/var/lib/comanager"
//!
//! [store.retry]
//! max_attempts = 3
//! base_delay_ms = 50
//! multiplier = 2.0
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub executor: ExecutorConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Start execution as soon as a task is created. When false, tasks are
    /// created `pending` and wait for an explicit start.
    pub auto_start: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { auto_start: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub success_probability: f64,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            success_probability: 0.9,
            min_delay_ms: 500,
            max_delay_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub retry: RetryConfig,
    /// Root of the JSON document store. `None` lets the caller pick.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 50,
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = self.executor.success_probability;
        if !(0.0..=1.0).contains(&p) {
            return Err(ConfigError::Invalid(format!(
                "executor.success_probability must be within [0, 1], got {p}"
            )));
        }
        if self.executor.min_delay_ms > self.executor.max_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "executor.min_delay_ms ({}) exceeds executor.max_delay_ms ({})",
                self.executor.min_delay_ms, self.executor.max_delay_ms
            )));
        }
        if self.store.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "store.retry.max_attempts must be at least 1".into(),
            ));
        }
        if !(self.store.retry.multiplier >= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "store.retry.multiplier must be >= 1, got {}",
                self.store.retry.multiplier
            )));
        }
        Ok(())
    }
}
