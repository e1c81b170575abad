// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Periodic chain validator.
//
// A run enumerates every process in the store, verifies each chain, and
// sends a single consolidated alert when any process fails.  Failures are
// isolated per process: a storage or key-manager error while checking one
// chain is recorded as that process's failure and the scan continues.
//
// Scheduling: a Tokio interval drives runs on the blocking pool, one run at
// a time.  The stop flag is honored between processes, never inside a
// single chain verification.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use ledgerwerk_core::error::{LedgerError, Result};
use ledgerwerk_store::SecureStore;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::alert::{AdminDirectory, DeliveryReport, IntegrityAlert, Notifier, dispatch};

/// Shortest schedule `spawn` accepts.  Shorter intervals, zero included, are
/// raised to this.
pub const MIN_SCHEDULE_INTERVAL: Duration = Duration::from_millis(10);

/// One process that did not verify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessFailure {
    pub process_id: String,
    pub messages: Vec<String>,
}

/// Outcome of a single validation run.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Processes present in storage when the run began.
    pub total_processes: usize,
    /// Processes actually checked.  Lower than the total when cancelled.
    pub checked_processes: usize,
    pub valid_processes: usize,
    pub failures: Vec<ProcessFailure>,
    pub cancelled: bool,
    /// Present when an alert was sent.
    pub delivery: Option<DeliveryReport>,
}

impl ValidationReport {
    pub fn all_valid(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_process_ids(&self) -> Vec<String> {
        self.failures.iter().map(|f| f.process_id.clone()).collect()
    }
}

/// Clears the running flag when a run ends, including by panic.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ChainValidator {
    store: Arc<SecureStore>,
    directory: Arc<dyn AdminDirectory>,
    notifier: Arc<dyn Notifier>,
    collapse_cascading_breaks: bool,
    running: AtomicBool,
}

impl ChainValidator {
    pub fn new(
        store: Arc<SecureStore>,
        directory: Arc<dyn AdminDirectory>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            directory,
            notifier,
            collapse_cascading_breaks: true,
            running: AtomicBool::new(false),
        }
    }

    /// Report every inherited break instead of a summary line.
    pub fn with_collapse(mut self, collapse: bool) -> Self {
        self.collapse_cascading_breaks = collapse;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Validate every process once.
    ///
    /// Returns `Ok(None)` when another run is already in progress.  Fails
    /// only if the process list itself cannot be read.
    #[instrument(skip_all)]
    pub fn run_once(&self, stop: &AtomicBool) -> Result<Option<ValidationReport>> {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            warn!("validation run already in progress, skipping");
            return Ok(None);
        };

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let processes = self.store.list_processes()?;
        info!(%run_id, processes = processes.len(), "chain validation started");

        let mut checked = 0usize;
        let mut valid = 0usize;
        let mut failures = Vec::new();
        let mut cancelled = false;

        for process_id in &processes {
            if stop.load(Ordering::Acquire) {
                info!(%run_id, checked, "chain validation cancelled");
                cancelled = true;
                break;
            }
            checked += 1;

            match self.store.verify_chain(process_id) {
                Ok(verification) if verification.is_valid() => valid += 1,
                Ok(verification) => failures.push(ProcessFailure {
                    process_id: process_id.clone(),
                    messages: verification.messages(self.collapse_cascading_breaks),
                }),
                Err(e) => {
                    error!(%process_id, error = %e, "chain verification could not complete");
                    failures.push(ProcessFailure {
                        process_id: process_id.clone(),
                        messages: vec![format!("verification could not complete: {e}")],
                    });
                }
            }
        }

        let mut report = ValidationReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            total_processes: processes.len(),
            checked_processes: checked,
            valid_processes: valid,
            failures,
            cancelled,
            delivery: None,
        };

        if report.all_valid() {
            info!(%run_id, valid, "all chains intact");
        } else {
            warn!(%run_id, failed = report.failures.len(), "chain integrity failures found");
            report.delivery = self.send_alert(&report);
        }
        Ok(Some(report))
    }

    fn send_alert(&self, report: &ValidationReport) -> Option<DeliveryReport> {
        let alert = IntegrityAlert {
            run_id: report.run_id,
            generated_at: report.finished_at,
            total_processes: report.total_processes,
            valid_processes: report.valid_processes,
            failed_process_ids: report.failed_process_ids(),
            messages: report
                .failures
                .iter()
                .flat_map(|f| f.messages.iter().map(move |m| format!("{}: {m}", f.process_id)))
                .collect(),
        };
        match dispatch(self.directory.as_ref(), self.notifier.as_ref(), &alert) {
            Ok(delivery) => Some(delivery),
            Err(e) => {
                error!(run_id = %report.run_id, error = %e, "administrator directory unavailable, alert not sent");
                None
            }
        }
    }

    /// Run on a fixed interval until the returned handle is shut down.
    ///
    /// Must be called from within a Tokio runtime.  `interval` is raised to
    /// [`MIN_SCHEDULE_INTERVAL`] if shorter.
    pub fn spawn(self: Arc<Self>, interval: Duration, run_on_start: bool) -> ValidatorHandle {
        let interval = interval.max(MIN_SCHEDULE_INTERVAL);
        let stop = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(Notify::new());

        let task = {
            let stop = Arc::clone(&stop);
            let shutdown = Arc::clone(&shutdown);
            tokio::spawn(async move {
                self.schedule_loop(interval, run_on_start, stop, shutdown).await;
            })
        };

        info!(interval_ms = interval.as_millis() as u64, "chain validator scheduled");
        ValidatorHandle {
            stop,
            shutdown,
            task,
        }
    }

    async fn schedule_loop(
        self: Arc<Self>,
        interval: Duration,
        run_on_start: bool,
        stop: Arc<AtomicBool>,
        shutdown: Arc<Notify>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        if !run_on_start {
            // The first tick completes immediately.
            ticker.tick().await;
        }

        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    debug!("validator received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    let validator = Arc::clone(&self);
                    let stop = Arc::clone(&stop);
                    let outcome =
                        tokio::task::spawn_blocking(move || validator.run_once(&stop)).await;
                    match outcome {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => error!(error = %e, "validation run failed"),
                        Err(e) => error!(error = %e, "validation task panicked"),
                    }
                }
            }
            if stop.load(Ordering::Acquire) {
                break;
            }
        }
    }
}

/// Handle to a scheduled validator.
pub struct ValidatorHandle {
    stop: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

impl ValidatorHandle {
    /// Stop scheduling and wait for the current run to reach a process
    /// boundary.
    pub async fn shutdown(self) -> Result<()> {
        info!("stopping chain validator");
        self.stop.store(true, Ordering::Release);
        self.shutdown.notify_one();
        self.task
            .await
            .map_err(|e| LedgerError::Scheduler(format!("validator task join: {e}")))?;
        info!("chain validator stopped");
        Ok(())
    }
}
