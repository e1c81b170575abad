// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Persistence contract for sealed records.

use chrono::{DateTime, Utc};
use ledgerwerk_core::error::Result;
use ledgerwerk_core::types::{RecordId, RecordType, SecureRecord};
use ledgerwerk_security::chain_hash;

/// A sealed and signed record that has not yet been placed in its chain.
///
/// Repositories turn this into a [`SecureRecord`] inside their per-process
/// serialization point: read the tail hash, compute the chain hash, assign
/// the id, insert.
#[derive(Debug, Clone)]
pub struct PendingRecord {
    pub process_id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub encrypted_data: Vec<u8>,
    pub encryption_nonce: Vec<u8>,
    pub encryption_tag: Vec<u8>,
    pub key_version: i64,
    pub system_key_id: String,
    pub process_key_hash: String,
    pub data_signature: String,
    pub signature_public_key: String,
    pub record_type: RecordType,
    pub status: Option<String>,
}

impl PendingRecord {
    /// Chain hash this record will carry when appended after `prev_hash`.
    pub fn chain_hash_after(&self, prev_hash: &str) -> String {
        chain_hash(
            prev_hash,
            &self.data_signature,
            &self.user_id,
            &self.process_id,
            self.created_at.timestamp(),
        )
    }

    pub fn into_record(self, id: RecordId, prev_record_hash: String, chain_hash: String) -> SecureRecord {
        SecureRecord {
            id,
            process_id: self.process_id,
            user_id: self.user_id,
            created_at: self.created_at,
            encrypted_data: self.encrypted_data,
            encryption_nonce: self.encryption_nonce,
            encryption_tag: self.encryption_tag,
            key_version: self.key_version,
            system_key_id: self.system_key_id,
            process_key_hash: self.process_key_hash,
            data_signature: self.data_signature,
            signature_public_key: self.signature_public_key,
            record_type: self.record_type,
            status: self.status,
            prev_record_hash,
            chain_hash,
        }
    }
}

/// Ordered, append-only storage of sealed records.
///
/// Implementations must be thread-safe.  `append` must read the chain tail
/// and insert the new row as one atomic step per process: two concurrent
/// appends to the same process may never observe the same tail.
pub trait RecordRepository: Send + Sync {
    /// Link `pending` to the current tail of its process and persist it.
    fn append(&self, pending: PendingRecord) -> Result<SecureRecord>;

    /// Chain hash of the newest record of a process, `None` for an empty one.
    fn latest_chain_hash(&self, process_id: &str) -> Result<Option<String>>;

    fn get(&self, id: RecordId) -> Result<Option<SecureRecord>>;

    /// Stream every record of a process in ascending id order.
    fn visit_process(
        &self,
        process_id: &str,
        visitor: &mut dyn FnMut(SecureRecord) -> Result<()>,
    ) -> Result<()>;

    /// Every record of a process in ascending id order.
    fn records_for_process(&self, process_id: &str) -> Result<Vec<SecureRecord>> {
        let mut records = Vec::new();
        self.visit_process(process_id, &mut |record| {
            records.push(record);
            Ok(())
        })?;
        Ok(records)
    }

    /// Distinct process ids, in order of first appearance.
    fn process_ids(&self) -> Result<Vec<String>>;

    /// Total number of records across all processes.
    fn count(&self) -> Result<u64>;
}
