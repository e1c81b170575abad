// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// ledgerwerk-store: the sealed, signed, hash-chained record store.
//
// `SecureStore` is the entry point.  Persistence sits behind the
// `RecordRepository` trait with a SQLite backend for deployments and an
// in-memory backend for tests and tooling.

pub mod chain;
pub mod memory;
pub mod repository;
pub mod sqlite;
pub mod store;

pub use chain::{BreakCause, ChainCheckpoint, ChainIssue, ChainVerification, ChainVerifier};
pub use memory::MemoryRepository;
pub use repository::{PendingRecord, RecordRepository};
pub use sqlite::SqliteRepository;
pub use store::SecureStore;
