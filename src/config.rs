//! Engine configuration, read from TOML.
//!
//! ```toml
//! mode = "network"
//! tick_interval_ms = 50
//! capture_interval_ms = 100
//! max_snapshots = 1000
//! device_id = "bench-01"
//! ```
//!
//! Every key is optional and falls back to [`EngineConfig::default`].

use crate::recording::RecordingOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Where instances run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Everything in-process on a single simulated device.
    #[default]
    Detached,
    /// Instances exchange channel messages through a gateway.
    Network,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub mode: Mode,
    pub tick_interval_ms: u64,
    pub capture_interval_ms: u64,
    pub max_snapshots: usize,
    pub device_id: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Detached,
            tick_interval_ms: 100,
            capture_interval_ms: 100,
            max_snapshots: 1000,
            device_id: "local".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn recording_options(&self) -> RecordingOptions {
        RecordingOptions {
            capture_interval: Duration::from_millis(self.capture_interval_ms),
            max_snapshots: self.max_snapshots,
        }
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("tick_interval_ms must be positive".into()));
        }
        if self.capture_interval_ms == 0 {
            return Err(ConfigError::Invalid("capture_interval_ms must be positive".into()));
        }
        if self.max_snapshots == 0 {
            return Err(ConfigError::Invalid("max_snapshots must be positive".into()));
        }
        if self.device_id.trim().is_empty() {
            return Err(ConfigError::Invalid("device_id must not be empty".into()));
        }
        Ok(self)
    }
}
