// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Plain-language error messages for operators and the surrounding
// application.  Output is safe to display: it names at most a record id,
// never key material or payload content.

use crate::error::LedgerError;
use crate::retry::{ErrorClass, classify_error};

/// Severity of an error from the operator's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Outage, try again later.
    Transient,
    /// Caller or configuration must change.
    ActionRequired,
    /// Data integrity is in question.  Investigate.
    Critical,
}

/// A displayable error with an actionable suggestion.
#[derive(Debug, Clone)]
pub struct OperatorMessage {
    pub message: String,
    pub suggestion: String,
    pub retriable: bool,
    pub severity: Severity,
}

pub fn operator_message(err: &LedgerError) -> OperatorMessage {
    let retriable = classify_error(err) == ErrorClass::Transient;
    let (message, suggestion, severity) = match err {
        LedgerError::AccessDenied { process_id, .. } => (
            format!("You are not authorized for audit trail {process_id}."),
            "Ask an administrator to grant access to this review.".to_string(),
            Severity::ActionRequired,
        ),
        LedgerError::KeyManager(_) => (
            "The key service is not reachable.".to_string(),
            "Try again shortly. Sealed records are unaffected.".to_string(),
            Severity::Transient,
        ),
        LedgerError::Serialization(_) | LedgerError::InvalidPayload { .. } => (
            "The record content could not be encoded.".to_string(),
            "Check that the record type and its fields match.".to_string(),
            Severity::ActionRequired,
        ),
        LedgerError::Encryption(_) => (
            "The record could not be sealed.".to_string(),
            "The encryption engine is misconfigured. Contact an administrator.".to_string(),
            Severity::ActionRequired,
        ),
        LedgerError::SignatureVerificationFailed { record_id } => (
            format!("Record {record_id} failed its signature check."),
            "The stored data may have been altered. Report this to an administrator.".to_string(),
            Severity::Critical,
        ),
        LedgerError::DecryptionFailed { record_id } => (
            format!("Record {record_id} could not be opened."),
            "The stored data may be corrupted or altered. Report this to an administrator."
                .to_string(),
            Severity::Critical,
        ),
        LedgerError::ChainBroken { position, process_id, .. } => (
            format!("The audit trail {process_id} is broken at record {position}."),
            "Records may have been removed or reordered. Report this to an administrator."
                .to_string(),
            Severity::Critical,
        ),
        LedgerError::Persistence(_) | LedgerError::Io(_) => (
            "The audit database is unavailable.".to_string(),
            "Try again. Nothing was partially written.".to_string(),
            Severity::Transient,
        ),
        LedgerError::RecordNotFound(id) => (
            format!("Record {id} does not exist."),
            "Check the record reference.".to_string(),
            Severity::ActionRequired,
        ),
        LedgerError::Config(_) => (
            "The configuration file could not be read.".to_string(),
            "Fix or remove ledgerwerk.json and restart.".to_string(),
            Severity::ActionRequired,
        ),
        LedgerError::MasterKey(_) => (
            "The master key is malformed.".to_string(),
            "Set LEDGERWERK_MASTER_KEY to the 64-character hex secret this store was created with."
                .to_string(),
            Severity::ActionRequired,
        ),
        LedgerError::InvalidArgument(detail) => (
            format!("The command cannot run: {detail}."),
            "Check the command arguments.".to_string(),
            Severity::ActionRequired,
        ),
        LedgerError::Scheduler(_) => (
            "The background validator stopped unexpectedly.".to_string(),
            "Check the log for the failed run and restart the watch.".to_string(),
            Severity::ActionRequired,
        ),
        LedgerError::Alert(_) => (
            "An integrity alert could not be delivered.".to_string(),
            "Check the notification channel configuration.".to_string(),
            Severity::Transient,
        ),
    };

    OperatorMessage {
        message,
        suggestion,
        retriable,
        severity,
    }
}
