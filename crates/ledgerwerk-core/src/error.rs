// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Ledgerwerk.
//
// No variant ever carries key bytes, nonces, or plaintext.  Identifiers
// (process, user, record id) are the only context attached to a failure.

use thiserror::Error;

/// Top-level error type for all Ledgerwerk operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    // -- Authorization --
    #[error("access denied: user {user_id} may not use keys for process {process_id}")]
    AccessDenied { user_id: String, process_id: String },

    #[error("key manager unavailable: {0}")]
    KeyManager(String),

    // -- Payload handling --
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("payload does not match record type {record_type}: {reason}")]
    InvalidPayload { record_type: String, reason: String },

    // -- Cryptography --
    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("signature verification failed for record {record_id}: data may be tampered")]
    SignatureVerificationFailed { record_id: i64 },

    #[error("decryption failed for record {record_id}: data may be corrupted")]
    DecryptionFailed { record_id: i64 },

    // -- Chain integrity --
    #[error("chain broken at record {position} (id {record_id}) of process {process_id}")]
    ChainBroken {
        process_id: String,
        record_id: i64,
        position: usize,
    },

    // -- Storage / persistence --
    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("record {0} not found")]
    RecordNotFound(i64),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    // -- Configuration / operation --
    #[error("configuration error: {0}")]
    Config(String),

    #[error("master key rejected: {0}")]
    MasterKey(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("validator task failed: {0}")]
    Scheduler(String),

    #[error("alert delivery failed: {0}")]
    Alert(String),
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl LedgerError {
    /// True for the variants that are evidence of tampering rather than an
    /// operational fault.
    pub fn is_tamper_evidence(&self) -> bool {
        matches!(
            self,
            Self::SignatureVerificationFailed { .. }
                | Self::DecryptionFailed { .. }
                | Self::ChainBroken { .. }
        )
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LedgerError>;
