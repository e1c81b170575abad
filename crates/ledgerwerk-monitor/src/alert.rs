// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Integrity alerting.
//
// One consolidated alert per validation run, delivered to every
// administrator.  A failed delivery to one administrator is logged and
// recorded but never prevents delivery to the rest.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use ledgerwerk_core::config::AdminContact;
use ledgerwerk_core::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Summary of a failed validation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityAlert {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub total_processes: usize,
    pub valid_processes: usize,
    pub failed_process_ids: Vec<String>,
    /// Failure messages, each prefixed with its process id.
    pub messages: Vec<String>,
}

impl IntegrityAlert {
    pub fn subject(&self) -> String {
        format!(
            "[ledgerwerk] audit chain integrity failure: {} of {} processes",
            self.failed_process_ids.len(),
            self.total_processes
        )
    }

    pub fn body(&self) -> String {
        let mut body = format!(
            "Chain validation run {} at {} found integrity violations.\n\n\
             Processes checked: {}\n\
             Valid:             {}\n\
             Failed:            {}\n\n\
             Failed processes:\n",
            self.run_id,
            self.generated_at.to_rfc3339(),
            self.total_processes,
            self.valid_processes,
            self.failed_process_ids.len(),
        );
        for pid in &self.failed_process_ids {
            body.push_str(&format!("  - {pid}\n"));
        }
        body.push_str("\nDetails:\n");
        for message in &self.messages {
            body.push_str(&format!("  {message}\n"));
        }
        body
    }
}

/// Source of alert recipients.
pub trait AdminDirectory: Send + Sync {
    fn administrators(&self) -> Result<Vec<AdminContact>>;
}

/// Fixed recipient list, typically from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory(pub Vec<AdminContact>);

impl AdminDirectory for StaticDirectory {
    fn administrators(&self) -> Result<Vec<AdminContact>> {
        Ok(self.0.clone())
    }
}

/// Delivers an alert to one administrator.
pub trait Notifier: Send + Sync {
    fn notify(&self, admin: &AdminContact, alert: &IntegrityAlert) -> Result<()>;
}

/// Emits alerts as `error!` events.  Always succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, admin: &AdminContact, alert: &IntegrityAlert) -> Result<()> {
        error!(
            run_id = %alert.run_id,
            admin = %admin.user_id,
            failed = alert.failed_process_ids.len(),
            total = alert.total_processes,
            "{}",
            alert.subject()
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct OutboxEntry<'a> {
    to: &'a str,
    subject: String,
    body: String,
    alert: &'a IntegrityAlert,
}

/// Appends one JSON line per recipient to an outbox file, for an external
/// mailer to pick up.
#[derive(Debug)]
pub struct OutboxNotifier {
    path: PathBuf,
    lock: Mutex<()>,
}

impl OutboxNotifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl Notifier for OutboxNotifier {
    fn notify(&self, admin: &AdminContact, alert: &IntegrityAlert) -> Result<()> {
        let entry = OutboxEntry {
            to: &admin.email,
            subject: alert.subject(),
            body: alert.body(),
            alert,
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let _guard = self
            .lock
            .lock()
            .map_err(|_| LedgerError::Alert("outbox lock poisoned".into()))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| LedgerError::Alert(format!("{}: {e}", self.path.display())))?;
        file.write_all(line.as_bytes())
            .map_err(|e| LedgerError::Alert(format!("{}: {e}", self.path.display())))?;
        Ok(())
    }
}

/// Keeps delivered alerts in memory.  For embedding applications that
/// forward alerts themselves, and for tests.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    delivered: Mutex<Vec<(String, IntegrityAlert)>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(recipient user id, alert)` pairs in delivery order.
    pub fn delivered(&self) -> Vec<(String, IntegrityAlert)> {
        self.delivered
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, admin: &AdminContact, alert: &IntegrityAlert) -> Result<()> {
        self.delivered
            .lock()
            .map_err(|_| LedgerError::Alert("notifier lock poisoned".into()))?
            .push((admin.user_id.clone(), alert.clone()));
        Ok(())
    }
}

/// Outcome of fanning one alert out to every administrator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    /// `(user id, error)` for each administrator that was not reached.
    pub failed: Vec<(String, String)>,
}

/// Send `alert` to every administrator in `directory`.
///
/// Only a directory failure is an error; individual delivery failures are
/// collected in the report.
#[instrument(skip_all, fields(run_id = %alert.run_id))]
pub fn dispatch(
    directory: &dyn AdminDirectory,
    notifier: &dyn Notifier,
    alert: &IntegrityAlert,
) -> Result<DeliveryReport> {
    let admins = directory.administrators()?;
    if admins.is_empty() {
        warn!("no administrators configured, integrity alert not delivered");
    }

    let mut report = DeliveryReport::default();
    for admin in &admins {
        match notifier.notify(admin, alert) {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                warn!(admin = %admin.user_id, error = %e, "alert delivery failed");
                report.failed.push((admin.user_id.clone(), e.to_string()));
            }
        }
    }
    info!(
        delivered = report.delivered,
        failed = report.failed.len(),
        "integrity alert dispatched"
    );
    Ok(report)
}
