// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central service layer.  Opens the record database, builds the key
// manager from the environment-supplied master key, and hands out the
// store and validator the commands need.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ledgerwerk_core::error::Result;
use ledgerwerk_core::LedgerConfig;
use ledgerwerk_monitor::{ChainValidator, LogNotifier, Notifier, OutboxNotifier, StaticDirectory};
use ledgerwerk_security::LocalKeyManager;
use ledgerwerk_store::{SecureStore, SqliteRepository};
use tracing::info;

pub struct AppServices {
    data_dir: PathBuf,
    config: LedgerConfig,
    store: Arc<SecureStore>,
}

impl AppServices {
    /// Initialise all services.  Creates the data directory if needed.
    pub fn init(data_dir: PathBuf, master_key_hex: &str) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)?;
        info!(path = %data_dir.display(), "initialising services");

        let config = LedgerConfig::load(&data_dir)?;
        let repository = SqliteRepository::open(config.database_path(&data_dir))?;
        // The operator tool only verifies, so it may open any process.
        let keys = LocalKeyManager::from_hex(master_key_hex, config.system_key_id.clone())?
            .allow_all();

        let store = SecureStore::new(Arc::new(keys), Arc::new(repository))
            .with_key_version(config.key_version);

        Ok(Self {
            data_dir,
            config,
            store: Arc::new(store),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn store(&self) -> &SecureStore {
        &self.store
    }

    /// A validator alerting the configured administrators.  Alerts go to
    /// `outbox` as JSON lines when given, otherwise to the log.
    pub fn validator(&self, outbox: Option<PathBuf>) -> ChainValidator {
        let notifier: Arc<dyn Notifier> = match outbox {
            Some(path) => Arc::new(OutboxNotifier::new(path)),
            None => Arc::new(LogNotifier),
        };
        let directory = Arc::new(StaticDirectory(self.config.administrators.clone()));
        ChainValidator::new(Arc::clone(&self.store), directory, notifier)
            .with_collapse(self.config.validator.collapse_cascading_breaks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    const KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    #[test]
    fn init_creates_database_in_data_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested");
        let services = AppServices::init(dir.clone(), KEY).unwrap();

        assert!(dir.join("ledger.db").exists());
        assert_eq!(services.config().system_key_id, "system-key-1");
        assert!(services.store().list_processes().unwrap().is_empty());
    }

    #[test]
    fn bad_master_key_is_rejected_as_master_key() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(
            AppServices::init(tmp.path().to_path_buf(), "short"),
            Err(ledgerwerk_core::LedgerError::MasterKey(_))
        ));
    }

    #[test]
    fn validator_runs_against_empty_store() {
        let tmp = tempfile::tempdir().unwrap();
        let services = AppServices::init(tmp.path().to_path_buf(), KEY).unwrap();
        let report = services
            .validator(None)
            .run_once(&AtomicBool::new(false))
            .unwrap()
            .unwrap();
        assert!(report.all_valid());
        assert_eq!(report.total_processes, 0);
    }
}
