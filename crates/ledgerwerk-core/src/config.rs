// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application configuration.
//
// Secrets never live here.  The master key for the local key manager is
// supplied through the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{LedgerError, Result};
use crate::retry::RetryConfig;

/// File name of the persisted configuration inside the data directory.
pub const CONFIG_FILE: &str = "ledgerwerk.json";

/// Persistent settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// SQLite database path.  `None` means `<data dir>/ledger.db`.
    pub database_path: Option<PathBuf>,
    /// Identifier of the active system key, recorded on every new record.
    pub system_key_id: String,
    /// Key version recorded on every new record.
    pub key_version: i64,
    pub validator: ValidatorConfig,
    /// Recipients of integrity alerts.
    pub administrators: Vec<AdminContact>,
    pub retry: RetrySettings,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            system_key_id: "system-key-1".into(),
            key_version: 1,
            validator: ValidatorConfig::default(),
            administrators: Vec::new(),
            retry: RetrySettings::default(),
        }
    }
}

/// Periodic chain validation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub enabled: bool,
    /// Seconds between validation runs.
    pub interval_secs: u64,
    /// Report only the first divergence of a cascading break plus a count.
    pub collapse_cascading_breaks: bool,
    /// Run once immediately instead of waiting a full interval.
    pub run_on_start: bool,
}

impl ValidatorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 6 * 60 * 60,
            collapse_cascading_breaks: true,
            run_on_start: true,
        }
    }
}

/// An administrator who receives integrity alerts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminContact {
    pub user_id: String,
    pub email: String,
}

/// Serializable form of [`RetryConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 50,
            max_delay_ms: 2_000,
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(s: &RetrySettings) -> Self {
        RetryConfig {
            max_retries: s.max_retries,
            base_delay: Duration::from_millis(s.base_delay_ms),
            max_delay: Duration::from_millis(s.max_delay_ms),
        }
    }
}

impl LedgerConfig {
    /// Load the config from `data_dir`, falling back to defaults when the
    /// file does not exist.  A file that exists but does not parse is an
    /// error rather than a silent reset.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        let config = serde_json::from_str(&data)
            .map_err(|e| LedgerError::Config(format!("{}: {e}", path.display())))?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Persist the config as pretty JSON into `data_dir`.
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let path = data_dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        Ok(())
    }

    /// Resolve the database path against `data_dir`.
    pub fn database_path(&self, data_dir: &Path) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| data_dir.join("ledger.db"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = LedgerConfig::load(dir.path()).unwrap();
        assert_eq!(config.key_version, 1);
        assert!(config.validator.collapse_cascading_breaks);
        assert_eq!(config.database_path(dir.path()), dir.path().join("ledger.db"));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = LedgerConfig::default();
        config.system_key_id = "sk-2026".into();
        config.administrators.push(AdminContact {
            user_id: "admin-1".into(),
            email: "admin@example.org".into(),
        });
        config.save(dir.path()).unwrap();

        let loaded = LedgerConfig::load(dir.path()).unwrap();
        assert_eq!(loaded.system_key_id, "sk-2026");
        assert_eq!(loaded.administrators, config.administrators);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{ "validator": { "interval_secs": 60 } }"#,
        )
        .unwrap();
        let config = LedgerConfig::load(dir.path()).unwrap();
        assert_eq!(config.validator.interval(), Duration::from_secs(60));
        assert!(config.validator.enabled);
        assert_eq!(config.system_key_id, "system-key-1");
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{ nope").unwrap();
        assert!(matches!(
            LedgerConfig::load(dir.path()),
            Err(LedgerError::Config(_))
        ));
    }
}
