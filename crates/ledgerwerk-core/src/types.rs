// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Ledgerwerk audit store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::payload::PlainData;

/// Sequence number assigned by the persistence layer.  Defines chain order.
pub type RecordId = i64;

/// The `prev_record_hash` of the first record in every process: 64 zero
/// hex characters.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Caller-defined tag distinguishing kinds of sealed entries.
///
/// The tag is mixed into the AEAD associated data, so a ciphertext sealed
/// under one type cannot be opened under another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum RecordType {
    ReviewerJustification,
    DiscussionComment,
    Custom(String),
}

impl RecordType {
    /// Stable string form, persisted and bound into associated data.
    pub fn as_str(&self) -> &str {
        match self {
            Self::ReviewerJustification => "reviewer_justification",
            Self::DiscussionComment => "discussion_comment",
            Self::Custom(tag) => tag,
        }
    }
}

impl From<&str> for RecordType {
    fn from(tag: &str) -> Self {
        match tag {
            "reviewer_justification" => Self::ReviewerJustification,
            "discussion_comment" => Self::DiscussionComment,
            other => Self::Custom(other.to_owned()),
        }
    }
}

impl From<String> for RecordType {
    fn from(tag: String) -> Self {
        Self::from(tag.as_str())
    }
}

impl From<RecordType> for String {
    fn from(record_type: RecordType) -> Self {
        record_type.as_str().to_owned()
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One sealed, signed, chain-linked audit entry as persisted.
///
/// Never mutated after insertion.  Plaintext is not part of this struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecureRecord {
    pub id: RecordId,
    pub process_id: String,
    pub user_id: String,
    /// Capture time.  Its unix seconds are bound into the chain hash.
    pub created_at: DateTime<Utc>,
    pub encrypted_data: Vec<u8>,
    /// 12-byte AES-GCM nonce.
    pub encryption_nonce: Vec<u8>,
    /// 16-byte AES-GCM authentication tag.
    pub encryption_tag: Vec<u8>,
    pub key_version: i64,
    pub system_key_id: String,
    pub process_key_hash: String,
    /// Hex-encoded Ed25519 signature over `encrypted_data || nonce || tag`.
    pub data_signature: String,
    /// Hex-encoded Ed25519 public key that must verify `data_signature`.
    pub signature_public_key: String,
    pub record_type: RecordType,
    pub status: Option<String>,
    pub prev_record_hash: String,
    pub chain_hash: String,
}

impl SecureRecord {
    /// The exact bytes covered by `data_signature`.
    pub fn signed_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(
            self.encrypted_data.len() + self.encryption_nonce.len() + self.encryption_tag.len(),
        );
        data.extend_from_slice(&self.encrypted_data);
        data.extend_from_slice(&self.encryption_nonce);
        data.extend_from_slice(&self.encryption_tag);
        data
    }

    /// Unix seconds of `created_at`, as bound into the chain hash.
    pub fn chain_timestamp(&self) -> i64 {
        self.created_at.timestamp()
    }

    pub fn is_genesis(&self) -> bool {
        self.prev_record_hash == GENESIS_HASH
    }
}

/// A caller's request to seal a new record.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub process_id: String,
    pub user_id: String,
    pub record_type: RecordType,
    pub data: PlainData,
    pub status: Option<String>,
}

impl NewRecord {
    pub fn new(
        process_id: impl Into<String>,
        user_id: impl Into<String>,
        record_type: RecordType,
        data: PlainData,
    ) -> Self {
        Self {
            process_id: process_id.into(),
            user_id: user_id.into(),
            record_type,
            data,
            status: None,
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_type_string_forms() {
        assert_eq!(
            RecordType::from("reviewer_justification"),
            RecordType::ReviewerJustification
        );
        assert_eq!(RecordType::from("escalation").as_str(), "escalation");
        assert_eq!(RecordType::DiscussionComment.to_string(), "discussion_comment");
    }

    #[test]
    fn record_type_serializes_as_plain_string() {
        let json = serde_json::to_string(&RecordType::Custom("x".into())).unwrap();
        assert_eq!(json, "\"x\"");
        let back: RecordType = serde_json::from_str("\"discussion_comment\"").unwrap();
        assert_eq!(back, RecordType::DiscussionComment);
    }

    #[test]
    fn genesis_is_64_zeros() {
        assert_eq!(GENESIS_HASH.len(), 64);
        assert!(GENESIS_HASH.chars().all(|c| c == '0'));
    }
}
