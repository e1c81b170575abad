// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// ledgerwerk-monitor: periodic chain validation and integrity alerts.

pub mod alert;
pub mod validator;

pub use alert::{
    AdminDirectory, DeliveryReport, IntegrityAlert, LogNotifier, MemoryNotifier, Notifier,
    OutboxNotifier, StaticDirectory, dispatch,
};
pub use validator::{
    ChainValidator, MIN_SCHEDULE_INTERVAL, ProcessFailure, ValidationReport, ValidatorHandle,
};
