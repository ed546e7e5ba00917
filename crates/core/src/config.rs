// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runner configuration (`<config-dir>/runner.toml`)
//!
//! ```toml
//! id = "job-1234"
//! hostname = "10.0.0.12"
//!
//! [timing]
//! stop_poll_interval = "5s"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// File name of the runner configuration inside the config dir
pub const CONFIG_FILE_NAME: &str = "runner.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config is missing the job id")]
    MissingId,
}

/// Retry, polling and grace intervals used by the executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// How many times backend initialization is attempted
    pub init_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub init_retry_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub stop_poll_interval: Duration,
    /// Pause after a fault's state push before the fault is re-raised
    #[serde(with = "humantime_serde")]
    pub fault_grace: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            init_attempts: 3,
            init_retry_delay: Duration::from_secs(10),
            stop_poll_interval: Duration::from_secs(5),
            fault_grace: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Job the runner was provisioned for
    pub id: String,
    #[serde(default)]
    pub hostname: Option<String>,
    /// Root of the local backend's storage; `<config-dir>/storage` when unset
    #[serde(default)]
    pub storage_root: Option<PathBuf>,
    #[serde(default)]
    pub timing: Timing,
}

impl RunnerConfig {
    /// Load `runner.toml` from the config dir
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            return Err(ConfigError::NotFound(path));
        }
        let content = std::fs::read_to_string(&path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: RunnerConfig = toml::from_str(content)?;
        if config.id.trim().is_empty() {
            return Err(ConfigError::MissingId);
        }
        Ok(config)
    }

    pub fn storage_root(&self, config_dir: &Path) -> PathBuf {
        self.storage_root
            .clone()
            .unwrap_or_else(|| config_dir.join("storage"))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
