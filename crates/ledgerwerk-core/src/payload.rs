// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Plaintext payloads.  These exist only in memory: they are serialized,
// sealed, and discarded by the store, and reconstructed on authorized reads.
//
// Serialization is deterministic because every map is a `BTreeMap`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::types::RecordType;

/// Current payload schema version written into new records.
pub const PAYLOAD_SCHEMA_VERSION: u32 = 1;

/// Schema-checked payload body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "schema", content = "body", rename_all = "snake_case")]
pub enum RecordPayload {
    /// A reviewer's justification for an assessment decision.
    ReviewerJustification {
        justification: String,
        decision: Option<String>,
    },
    /// A comment in a review discussion thread.
    DiscussionComment {
        comment: String,
        in_reply_to: Option<i64>,
    },
    /// Open-ended field map for record types without a fixed schema.
    Fields(BTreeMap<String, serde_json::Value>),
}

impl RecordPayload {
    fn schema_name(&self) -> &'static str {
        match self {
            Self::ReviewerJustification { .. } => "reviewer_justification",
            Self::DiscussionComment { .. } => "discussion_comment",
            Self::Fields(_) => "fields",
        }
    }
}

/// The logical payload a caller supplies and receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlainData {
    pub payload: RecordPayload,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub schema_version: u32,
}

impl PlainData {
    pub fn new(payload: RecordPayload) -> Self {
        Self {
            payload,
            metadata: BTreeMap::new(),
            schema_version: PAYLOAD_SCHEMA_VERSION,
        }
    }

    /// Build an open-ended payload from `(field, value)` pairs.
    pub fn from_fields<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, serde_json::Value)>,
    {
        Self::new(RecordPayload::Fields(
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Look up a field of an open-ended payload.
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        match &self.payload {
            RecordPayload::Fields(fields) => fields.get(name),
            _ => None,
        }
    }

    /// Reject typed payloads presented under a record type with a different
    /// schema.  Open-ended `Fields` payloads are accepted for any type.
    pub fn validate_for(&self, record_type: &RecordType) -> Result<()> {
        let ok = match (&self.payload, record_type) {
            (RecordPayload::Fields(_), _) => true,
            (RecordPayload::ReviewerJustification { justification, .. }, RecordType::ReviewerJustification) => {
                !justification.trim().is_empty()
            }
            (RecordPayload::DiscussionComment { comment, .. }, RecordType::DiscussionComment) => {
                !comment.trim().is_empty()
            }
            _ => {
                return Err(LedgerError::InvalidPayload {
                    record_type: record_type.to_string(),
                    reason: format!("{} payload not allowed", self.payload.schema_name()),
                });
            }
        };

        if ok {
            Ok(())
        } else {
            Err(LedgerError::InvalidPayload {
                record_type: record_type.to_string(),
                reason: "text body must not be empty".into(),
            })
        }
    }

    /// Deterministic byte encoding used as the AEAD plaintext.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| LedgerError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| LedgerError::Serialization(e.to_string()))
    }
}
