//! Persistent configuration (`<home>/config.json`).
//!
//! ```json
//! { "max_retries": 3, "backoff_base": 2, "worker_timeout": 300 }
//! ```
//!
//! `max_retries` は enqueue 時、`backoff_base` と `worker_timeout` は
//! worker 起動時に読む。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::queue::{DEFAULT_BACKOFF_BASE, RetryPolicy};

/// Env var that overrides the home directory.
pub const HOME_ENV: &str = "QUEUECTL_HOME";

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_WORKER_TIMEOUT_SECS: u64 = 300;

const KEYS: [&str; 3] = ["max_retries", "backoff_base", "worker_timeout"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown config key '{0}' (expected one of: max_retries, backoff_base, worker_timeout)")]
    UnknownKey(String),

    #[error("invalid value '{value}' for '{key}': {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Failures allowed before a job moves to the DLQ.
    pub max_retries: u32,

    /// Retry delay is `backoff_base ^ attempts` seconds.
    pub backoff_base: u32,

    /// Per-command wall-clock limit in seconds.
    pub worker_timeout: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
            worker_timeout: DEFAULT_WORKER_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Read the file, or write and return defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Self::default();
            config.save(path)?;
            return Ok(config);
        }
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<u64> {
        match normalize_key(key).as_str() {
            "max_retries" => Some(u64::from(self.max_retries)),
            "backoff_base" => Some(u64::from(self.backoff_base)),
            "worker_timeout" => Some(self.worker_timeout),
            _ => None,
        }
    }

    /// Parse and set one value. Does not save.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let key = normalize_key(key);
        let invalid = |reason: &str| ConfigError::InvalidValue {
            key: key.clone(),
            value: value.to_string(),
            reason: reason.to_string(),
        };

        match key.as_str() {
            "max_retries" => {
                self.max_retries = value
                    .trim()
                    .parse()
                    .map_err(|_| invalid("expected a non-negative integer"))?;
            }
            "backoff_base" => {
                let base: u32 = value
                    .trim()
                    .parse()
                    .map_err(|_| invalid("expected a positive integer"))?;
                if base == 0 {
                    return Err(invalid("must be at least 1"));
                }
                self.backoff_base = base;
            }
            "worker_timeout" => {
                let secs: u64 = value
                    .trim()
                    .parse()
                    .map_err(|_| invalid("expected a positive number of seconds"))?;
                if secs == 0 {
                    return Err(invalid("must be at least 1"));
                }
                self.worker_timeout = secs;
            }
            _ => return Err(ConfigError::UnknownKey(key)),
        }
        Ok(())
    }

    /// `(key, value)` pairs in display order.
    pub fn entries(&self) -> Vec<(&'static str, u64)> {
        KEYS.iter()
            .filter_map(|key| self.get(key).map(|value| (*key, value)))
            .collect()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.backoff_base.max(1))
    }

    pub fn worker_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_timeout.max(1))
    }
}

/// `max-retries` and `max_retries` name the same key.
fn normalize_key(key: &str) -> String {
    key.trim().to_ascii_lowercase().replace('-', "_")
}

/// `$QUEUECTL_HOME`, else `~/.queuectl`.
pub fn default_home() -> PathBuf {
    if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(home);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".queuectl")
}
