// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Chain verification.
//
// Records are checked one at a time in ascending id order.  Three checks run
// on every record and each produces its own issue:
//
//   1. Linkage:   stored prev hash equals the previous record's chain hash
//                 (or the genesis hash for position 1).
//   2. Recompute: stored chain hash equals the hash of the record's own
//                 fields.  Catches in-place edits of author, process or time.
//   3. Signature: the Ed25519 signature verifies over the sealed bytes.
//
// The expected prev hash always advances to the stored chain hash.  Once
// linkage or recomputation fails, the ledger is inconsistent from that point
// forward and every later record is reported as broken, inheriting the first
// divergence.

use std::fmt;

use chrono::{DateTime, Utc};
use ledgerwerk_core::error::LedgerError;
use ledgerwerk_core::types::{GENESIS_HASH, RecordId, SecureRecord};
use ledgerwerk_security::{chain_hash, verify_hex};
use serde::{Deserialize, Serialize};

/// Why a record's linkage is considered broken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakCause {
    /// The stored prev hash is not the predecessor's chain hash.
    LinkMismatch { expected: String, found: String },
    /// The record follows an earlier divergence.
    Inherited { from_position: usize },
}

/// A single integrity violation found while walking a chain.
///
/// Positions are 1-based within the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainIssue {
    Broken {
        position: usize,
        record_id: RecordId,
        cause: BreakCause,
    },
    HashMismatch {
        position: usize,
        record_id: RecordId,
    },
    InvalidSignature {
        position: usize,
        record_id: RecordId,
        reason: String,
    },
    /// The chain no longer matches a previously captured tail checkpoint.
    CheckpointMismatch { reason: String },
}

impl ChainIssue {
    pub fn is_inherited(&self) -> bool {
        matches!(
            self,
            Self::Broken {
                cause: BreakCause::Inherited { .. },
                ..
            }
        )
    }
}

impl fmt::Display for ChainIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Broken {
                position,
                record_id,
                cause: BreakCause::LinkMismatch { .. },
            } => write!(
                f,
                "chain broken at record {position} (id {record_id}): previous hash does not match"
            ),
            Self::Broken {
                position,
                record_id,
                cause: BreakCause::Inherited { from_position },
            } => write!(
                f,
                "chain broken at record {position} (id {record_id}): follows divergence at record {from_position}"
            ),
            Self::HashMismatch {
                position,
                record_id,
            } => write!(f, "chain hash mismatch at record {position} (id {record_id})"),
            Self::InvalidSignature {
                position,
                record_id,
                reason,
            } => write!(
                f,
                "signature verification failed at record {position} (id {record_id}): {reason}"
            ),
            Self::CheckpointMismatch { reason } => write!(f, "checkpoint mismatch: {reason}"),
        }
    }
}

/// Outcome of verifying one process's chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainVerification {
    pub process_id: String,
    pub records_checked: usize,
    pub issues: Vec<ChainIssue>,
    pub tail_record_id: Option<RecordId>,
    /// Stored chain hash of the last record walked.
    pub tail_hash: Option<String>,
}

impl ChainVerification {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    /// Position of the first record whose linkage or chain hash failed.
    pub fn first_divergence(&self) -> Option<usize> {
        self.issues.iter().find_map(|issue| match issue {
            ChainIssue::Broken {
                position,
                cause: BreakCause::LinkMismatch { .. },
                ..
            }
            | ChainIssue::HashMismatch { position, .. } => Some(*position),
            _ => None,
        })
    }

    /// Human-readable report lines.
    ///
    /// With `collapse`, inherited breaks are folded into one summary line
    /// after the first divergence; the typed issues are kept either way.
    pub fn messages(&self, collapse: bool) -> Vec<String> {
        if self.is_valid() {
            return vec![format!(
                "chain for process {} verified: {} records intact",
                self.process_id, self.records_checked
            )];
        }

        let mut lines = Vec::with_capacity(self.issues.len() + 1);
        let mut inherited = 0usize;
        let mut from = None;
        for issue in &self.issues {
            if collapse
                && let ChainIssue::Broken {
                    cause: BreakCause::Inherited { from_position },
                    ..
                } = issue
            {
                inherited += 1;
                from = Some(*from_position);
                continue;
            }
            lines.push(issue.to_string());
        }
        if let Some(from) = from {
            lines.push(format!(
                "{inherited} later records inherit the divergence at record {from}"
            ));
        }
        lines
    }

    /// Turn the first violation into a typed error.
    pub fn ensure_intact(&self) -> Result<(), LedgerError> {
        for issue in &self.issues {
            match issue {
                ChainIssue::Broken {
                    position,
                    record_id,
                    ..
                }
                | ChainIssue::HashMismatch {
                    position,
                    record_id,
                } => {
                    return Err(LedgerError::ChainBroken {
                        process_id: self.process_id.clone(),
                        record_id: *record_id,
                        position: *position,
                    });
                }
                ChainIssue::InvalidSignature { record_id, .. } => {
                    return Err(LedgerError::SignatureVerificationFailed {
                        record_id: *record_id,
                    });
                }
                ChainIssue::CheckpointMismatch { .. } => {
                    return Err(LedgerError::ChainBroken {
                        process_id: self.process_id.clone(),
                        record_id: self.tail_record_id.unwrap_or_default(),
                        position: self.records_checked,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Streaming verifier: feed records in ascending id order, then `finish`.
#[derive(Debug)]
pub struct ChainVerifier {
    process_id: String,
    expected_prev: String,
    position: usize,
    diverged_at: Option<usize>,
    issues: Vec<ChainIssue>,
    tail_record_id: Option<RecordId>,
}

impl ChainVerifier {
    pub fn new(process_id: impl Into<String>) -> Self {
        Self {
            process_id: process_id.into(),
            expected_prev: GENESIS_HASH.to_owned(),
            position: 0,
            diverged_at: None,
            issues: Vec::new(),
            tail_record_id: None,
        }
    }

    pub fn check(&mut self, record: &SecureRecord) {
        self.position += 1;
        let position = self.position;
        let record_id = record.id;

        let link_ok = record.prev_record_hash == self.expected_prev;
        if !link_ok {
            self.issues.push(ChainIssue::Broken {
                position,
                record_id,
                cause: BreakCause::LinkMismatch {
                    expected: self.expected_prev.clone(),
                    found: record.prev_record_hash.clone(),
                },
            });
        } else if let Some(from_position) = self.diverged_at {
            self.issues.push(ChainIssue::Broken {
                position,
                record_id,
                cause: BreakCause::Inherited { from_position },
            });
        }

        let recomputed = chain_hash(
            &record.prev_record_hash,
            &record.data_signature,
            &record.user_id,
            &record.process_id,
            record.chain_timestamp(),
        );
        let hash_ok = recomputed == record.chain_hash;
        if !hash_ok {
            self.issues.push(ChainIssue::HashMismatch {
                position,
                record_id,
            });
        }

        if let Err(e) = verify_hex(
            &record.signature_public_key,
            &record.data_signature,
            &record.signed_bytes(),
        ) {
            self.issues.push(ChainIssue::InvalidSignature {
                position,
                record_id,
                reason: e.to_string(),
            });
        }

        if self.diverged_at.is_none() && !(link_ok && hash_ok) {
            self.diverged_at = Some(position);
        }
        self.expected_prev = record.chain_hash.clone();
        self.tail_record_id = Some(record_id);
    }

    pub fn finish(self) -> ChainVerification {
        let tail_hash = self.tail_record_id.map(|_| self.expected_prev);
        ChainVerification {
            process_id: self.process_id,
            records_checked: self.position,
            issues: self.issues,
            tail_record_id: self.tail_record_id,
            tail_hash,
        }
    }
}

/// Snapshot of a chain's tail, for publishing to an independent log.
///
/// Hash chaining cannot reveal deletion of the newest record; comparing a
/// chain against an earlier checkpoint can.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainCheckpoint {
    pub process_id: String,
    pub record_count: usize,
    pub tail_record_id: Option<RecordId>,
    pub tail_chain_hash: String,
    pub taken_at: DateTime<Utc>,
}

impl ChainCheckpoint {
    pub fn from_verification(verification: &ChainVerification) -> Self {
        Self {
            process_id: verification.process_id.clone(),
            record_count: verification.records_checked,
            tail_record_id: verification.tail_record_id,
            tail_chain_hash: verification
                .tail_hash
                .clone()
                .unwrap_or_else(|| GENESIS_HASH.to_owned()),
            taken_at: Utc::now(),
        }
    }

    /// Issues explaining why `records` (the current chain, in id order) no
    /// longer extends this checkpoint.
    pub fn compare(&self, records: &[SecureRecord]) -> Vec<ChainIssue> {
        let mut issues = Vec::new();
        if records.len() < self.record_count {
            issues.push(ChainIssue::CheckpointMismatch {
                reason: format!(
                    "chain holds {} records, checkpoint recorded {}",
                    records.len(),
                    self.record_count
                ),
            });
        }

        let Some(tail_id) = self.tail_record_id else {
            return issues;
        };
        match records.iter().find(|r| r.id == tail_id) {
            None => issues.push(ChainIssue::CheckpointMismatch {
                reason: format!("checkpointed tail record {tail_id} is missing"),
            }),
            Some(record) if record.chain_hash != self.tail_chain_hash => {
                issues.push(ChainIssue::CheckpointMismatch {
                    reason: format!("checkpointed tail record {tail_id} has a different chain hash"),
                });
            }
            Some(_) => {}
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerwerk_core::types::RecordType;
    use ledgerwerk_security::SigningKey;

    fn chain(n: usize) -> Vec<SecureRecord> {
        let signer = SigningKey::from_seed(&[3u8; 32]).unwrap();
        let created_at = DateTime::parse_from_rfc3339("2026-05-04T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut prev = GENESIS_HASH.to_owned();
        let mut out = Vec::new();
        for i in 0..n {
            let mut record = SecureRecord {
                id: i as i64 + 1,
                process_id: "P1".into(),
                user_id: "carol".into(),
                created_at,
                encrypted_data: vec![i as u8; 16],
                encryption_nonce: vec![0; 12],
                encryption_tag: vec![5; 16],
                key_version: 1,
                system_key_id: "sk".into(),
                process_key_hash: "ph".into(),
                data_signature: String::new(),
                signature_public_key: signer.public_key_hex(),
                record_type: RecordType::DiscussionComment,
                status: None,
                prev_record_hash: prev.clone(),
                chain_hash: String::new(),
            };
            record.data_signature = hex::encode(signer.sign(&record.signed_bytes()));
            record.chain_hash = chain_hash(
                &prev,
                &record.data_signature,
                &record.user_id,
                &record.process_id,
                record.chain_timestamp(),
            );
            prev = record.chain_hash.clone();
            out.push(record);
        }
        out
    }

    fn verify(records: &[SecureRecord]) -> ChainVerification {
        let mut verifier = ChainVerifier::new("P1");
        for record in records {
            verifier.check(record);
        }
        verifier.finish()
    }

    #[test]
    fn intact_chain_reports_count() {
        let result = verify(&chain(3));
        assert!(result.is_valid());
        assert_eq!(result.records_checked, 3);
        assert_eq!(
            result.messages(true),
            vec!["chain for process P1 verified: 3 records intact".to_string()]
        );
        assert!(result.ensure_intact().is_ok());
    }

    #[test]
    fn empty_chain_is_valid() {
        let result = verify(&[]);
        assert!(result.is_valid());
        assert_eq!(result.tail_hash, None);
    }

    #[test]
    fn altered_link_breaks_from_that_record_on() {
        let mut records = chain(5);
        records[2].prev_record_hash = "f".repeat(64);

        let result = verify(&records);
        assert!(!result.is_valid());
        assert_eq!(result.first_divergence(), Some(3));

        let broken: Vec<usize> = result
            .issues
            .iter()
            .filter_map(|i| match i {
                ChainIssue::Broken { position, .. } => Some(*position),
                _ => None,
            })
            .collect();
        assert_eq!(broken, vec![3, 4, 5]);
        assert!(result.issues[0].to_string().starts_with("chain broken at record 3"));
        assert!(matches!(
            result.ensure_intact(),
            Err(LedgerError::ChainBroken { position: 3, .. })
        ));
    }

    #[test]
    fn collapsed_messages_summarise_the_cascade() {
        let mut records = chain(6);
        records[1].prev_record_hash = "e".repeat(64);
        let result = verify(&records);

        let full = result.messages(false);
        let collapsed = result.messages(true);
        assert!(full.len() > collapsed.len());
        assert!(collapsed.iter().any(|m| m.starts_with("chain broken at record 2")));
        assert_eq!(
            collapsed.last().unwrap(),
            "4 later records inherit the divergence at record 2"
        );
    }

    #[test]
    fn edited_author_fails_recomputation_only() {
        let mut records = chain(2);
        records[0].user_id = "mallory".into();
        let result = verify(&records);
        assert!(matches!(
            result.issues[0],
            ChainIssue::HashMismatch { position: 1, .. }
        ));
        assert!(result.messages(false)[0].starts_with("chain hash mismatch at record 1"));
    }

    #[test]
    fn bad_signature_is_reported_without_divergence() {
        let mut records = chain(3);
        records[1].encrypted_data[0] ^= 0x01;
        let result = verify(&records);
        assert_eq!(result.issues.len(), 1);
        assert!(matches!(
            result.issues[0],
            ChainIssue::InvalidSignature { position: 2, .. }
        ));
        assert_eq!(result.first_divergence(), None);
    }

    #[test]
    fn checkpoint_detects_tail_truncation() {
        let mut records = chain(4);
        let checkpoint = ChainCheckpoint::from_verification(&verify(&records));
        assert!(checkpoint.compare(&records).is_empty());

        records.pop();
        let issues = checkpoint.compare(&records);
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|i| matches!(i, ChainIssue::CheckpointMismatch { .. })));
        // The truncated chain is still internally consistent.
        assert!(verify(&records).is_valid());
    }
}
