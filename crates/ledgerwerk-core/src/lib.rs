// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Ledgerwerk: core types and error definitions shared across all crates.

pub mod config;
pub mod error;
pub mod operator_errors;
pub mod payload;
pub mod retry;
pub mod types;

pub use config::LedgerConfig;
pub use error::{LedgerError, Result};
pub use payload::{PlainData, RecordPayload};
pub use types::*;
