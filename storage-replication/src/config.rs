// SPDX-License-Identifier: GPL-3.0-only

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ReplicationError, Result};
use crate::retry::RetryPolicy;

/// Options for a sync, set once from the command line
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flags {
    /// Descend into child volumes.
    pub recursive: bool,
    /// Roll the destination back to its latest snapshot before receiving.
    pub force: bool,
    /// Show a progress bar per transfer.
    pub progress: bool,
    /// Send encrypted streams as raw.
    pub raw: bool,
    /// SSH compression option for remote endpoints.
    pub compression: Option<String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LoggingLevel {
    pub fn as_directive(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub backoff_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            backoff_secs: policy.backoff_unit.as_secs(),
        }
    }
}

/// Tool settings read from an optional TOML file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub zfs_binary: String,
    pub ssh_binary: String,
    pub log_level: LoggingLevel,
    pub retry: RetrySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            zfs_binary: "zfs".to_string(),
            ssh_binary: "ssh".to_string(),
            log_level: LoggingLevel::default(),
            retry: RetrySettings::default(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            ReplicationError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;

        Self::from_toml(&raw)
            .map_err(|e| ReplicationError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| ReplicationError::Config(e.to_string()))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_retries,
            Duration::from_secs(self.retry.backoff_secs),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.zfs_binary, "zfs");
        assert_eq!(settings.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn reads_partial_settings() {
        let settings = Settings::from_toml(
            "zfs_binary = \"/sbin/zfs\"\nlog_level = \"debug\"\n\n[retry]\nmax_retries = 5\n",
        )
        .unwrap();

        assert_eq!(settings.zfs_binary, "/sbin/zfs");
        assert_eq!(settings.ssh_binary, "ssh");
        assert_eq!(settings.log_level.as_directive(), "debug");
        assert_eq!(settings.retry_policy().max_retries, 5);
        assert_eq!(settings.retry_policy().backoff_unit, Duration::from_secs(1));
    }

    #[test]
    fn rejects_unknown_keys() {
        let error = Settings::from_toml("zfs = \"/sbin/zfs\"\n").unwrap_err();
        assert!(matches!(error, ReplicationError::Config(_)));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let error = Settings::load(Path::new("/nonexistent/storage-replication.toml")).unwrap_err();
        assert!(error.to_string().contains("failed to read"));
    }
}
