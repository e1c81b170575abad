// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// SecureStore: seals, signs, chains, and opens audit records.
//
// Write path:  access check → validate → serialize → DEK → seal(AD)
//              → sign(ciphertext‖nonce‖tag) → repository append (chain link).
// Read path:   signature check → DEK → open(AD) → deserialize.
//
// Plaintext and key material live only in zeroizing buffers for the
// duration of one call.

use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use ledgerwerk_core::error::{LedgerError, Result};
use ledgerwerk_core::payload::PlainData;
use ledgerwerk_core::retry::{RetryConfig, RetryDecision, should_retry};
use ledgerwerk_core::types::{NewRecord, RecordId, SecureRecord};
use ledgerwerk_security::{CryptoEngine, KeyManager, associated_data, verify_hex};
use tracing::{debug, info, instrument, warn};
use zeroize::Zeroizing;

use crate::chain::{ChainCheckpoint, ChainVerification, ChainVerifier};
use crate::repository::{PendingRecord, RecordRepository};

/// Key version written into new records unless overridden.
pub const DEFAULT_KEY_VERSION: i64 = 1;

pub struct SecureStore {
    keys: Arc<dyn KeyManager>,
    repository: Arc<dyn RecordRepository>,
    engine: CryptoEngine,
    key_version: i64,
}

impl SecureStore {
    pub fn new(keys: Arc<dyn KeyManager>, repository: Arc<dyn RecordRepository>) -> Self {
        Self {
            keys,
            repository,
            engine: CryptoEngine::new(),
            key_version: DEFAULT_KEY_VERSION,
        }
    }

    pub fn with_key_version(mut self, key_version: i64) -> Self {
        self.key_version = key_version;
        self
    }

    // -- Writes ---------------------------------------------------------------

    /// Seal, sign, and append a new record to its process chain.
    #[instrument(skip_all, fields(
        process_id = %request.process_id,
        user_id = %request.user_id,
        record_type = %request.record_type,
    ))]
    pub fn create_record(&self, request: NewRecord) -> Result<SecureRecord> {
        let NewRecord {
            process_id,
            user_id,
            record_type,
            data,
            status,
        } = request;

        self.keys.verify_key_access(&user_id, &process_id)?;
        data.validate_for(&record_type)?;

        let plaintext = Zeroizing::new(data.to_bytes()?);
        let dek = self.keys.derive_data_encryption_key(&process_id, &user_id)?;
        let aad = associated_data(&process_id, &user_id, record_type.as_str());
        let sealed = self
            .engine
            .seal(&plaintext, &dek, &aad)
            .map_err(|e| LedgerError::Encryption(e.to_string()))?;
        drop(dek);

        let mut signed = Vec::with_capacity(sealed.ciphertext.len() + sealed.nonce.len() + sealed.tag.len());
        signed.extend_from_slice(&sealed.ciphertext);
        signed.extend_from_slice(&sealed.nonce);
        signed.extend_from_slice(&sealed.tag);

        let signer = self.keys.user_signing_key(&user_id)?;
        let data_signature = hex::encode(signer.sign(&signed));
        let signature_public_key = signer.public_key_hex();
        drop(signer);

        let pending = PendingRecord {
            process_key_hash: self.keys.process_key_hash(&process_id)?,
            system_key_id: self.keys.active_system_key_id()?,
            process_id,
            user_id,
            // Microsecond precision is what the SQLite backend round-trips.
            created_at: Utc::now().trunc_subsecs(6),
            encrypted_data: sealed.ciphertext,
            encryption_nonce: sealed.nonce.to_vec(),
            encryption_tag: sealed.tag.to_vec(),
            key_version: self.key_version,
            data_signature,
            signature_public_key,
            record_type,
            status,
        };

        let record = self.repository.append(pending)?;
        info!(record_id = record.id, "secure record created");
        Ok(record)
    }

    /// [`create_record`](Self::create_record), re-run on transient failures
    /// with capped exponential backoff.
    pub fn create_record_with_retry(
        &self,
        request: NewRecord,
        config: &RetryConfig,
    ) -> Result<SecureRecord> {
        let mut attempt = 0;
        loop {
            match self.create_record(request.clone()) {
                Ok(record) => return Ok(record),
                Err(e) => match should_retry(&e, attempt, config) {
                    RetryDecision::RetryAfter(delay) => {
                        warn!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "create_record failed, retrying");
                        std::thread::sleep(delay);
                        attempt += 1;
                    }
                    RetryDecision::GiveUp(_) | RetryDecision::Exhausted => return Err(e),
                },
            }
        }
    }

    // -- Reads ----------------------------------------------------------------

    pub fn get_record(&self, id: RecordId) -> Result<SecureRecord> {
        self.repository
            .get(id)?
            .ok_or(LedgerError::RecordNotFound(id))
    }

    /// Every record of a process in chain order.  Ciphertext only.
    pub fn get_records_by_process(&self, process_id: &str) -> Result<Vec<SecureRecord>> {
        self.repository.records_for_process(process_id)
    }

    /// Fetch a record by id and return its verified plaintext.
    pub fn decrypt_record(&self, id: RecordId) -> Result<PlainData> {
        let record = self.get_record(id)?;
        self.decrypt_record_data(&record)
    }

    /// Verify and open a record.
    ///
    /// The signature is checked before any decryption is attempted, so a
    /// tampered record never reaches the AEAD.
    #[instrument(skip_all, fields(record_id = record.id, process_id = %record.process_id))]
    pub fn decrypt_record_data(&self, record: &SecureRecord) -> Result<PlainData> {
        self.verify_record_signature(record)?;

        let dek = self
            .keys
            .derive_data_encryption_key(&record.process_id, &record.user_id)?;
        let aad = associated_data(
            &record.process_id,
            &record.user_id,
            record.record_type.as_str(),
        );
        let plaintext = self
            .engine
            .open(
                &record.encrypted_data,
                &record.encryption_tag,
                &dek,
                &record.encryption_nonce,
                &aad,
            )
            .map_err(|_| {
                warn!("record failed authentication");
                LedgerError::DecryptionFailed {
                    record_id: record.id,
                }
            })?;

        let data = PlainData::from_bytes(&plaintext)?;
        debug!("record decrypted");
        Ok(data)
    }

    /// Check a record's Ed25519 signature over its sealed bytes.
    pub fn verify_record_signature(&self, record: &SecureRecord) -> Result<()> {
        verify_hex(
            &record.signature_public_key,
            &record.data_signature,
            &record.signed_bytes(),
        )
        .map_err(|e| {
            warn!(record_id = record.id, reason = %e, "record signature rejected");
            LedgerError::SignatureVerificationFailed {
                record_id: record.id,
            }
        })
    }

    // -- Integrity ------------------------------------------------------------

    /// Walk a process chain and report every integrity violation found.
    #[instrument(skip(self))]
    pub fn verify_chain(&self, process_id: &str) -> Result<ChainVerification> {
        let mut verifier = ChainVerifier::new(process_id);
        self.repository.visit_process(process_id, &mut |record| {
            verifier.check(&record);
            Ok(())
        })?;
        let verification = verifier.finish();

        if verification.is_valid() {
            info!(records = verification.records_checked, "chain verified");
        } else {
            warn!(
                records = verification.records_checked,
                issues = verification.issues.len(),
                first_divergence = ?verification.first_divergence(),
                "chain integrity violated"
            );
        }
        Ok(verification)
    }

    /// Capture the current tail of a process chain.
    ///
    /// The chain is verified first; a checkpoint of a broken chain would
    /// anchor the damage.
    pub fn checkpoint(&self, process_id: &str) -> Result<ChainCheckpoint> {
        let verification = self.verify_chain(process_id)?;
        verification.ensure_intact()?;
        let checkpoint = ChainCheckpoint::from_verification(&verification);
        info!(
            process_id,
            records = checkpoint.record_count,
            tail = ?checkpoint.tail_record_id,
            "checkpoint taken"
        );
        Ok(checkpoint)
    }

    /// Verify a chain and additionally check that it still extends `checkpoint`.
    pub fn verify_against_checkpoint(
        &self,
        checkpoint: &ChainCheckpoint,
    ) -> Result<ChainVerification> {
        let records = self.repository.records_for_process(&checkpoint.process_id)?;
        let mut verifier = ChainVerifier::new(checkpoint.process_id.as_str());
        for record in &records {
            verifier.check(record);
        }
        let mut verification = verifier.finish();
        verification.issues.extend(checkpoint.compare(&records));

        if !verification.is_valid() {
            warn!(
                process_id = %checkpoint.process_id,
                issues = verification.issues.len(),
                "chain does not extend checkpoint"
            );
        }
        Ok(verification)
    }

    // -- Statistics -------------------------------------------------------------

    /// Distinct process ids, in order of first appearance.
    pub fn list_processes(&self) -> Result<Vec<String>> {
        self.repository.process_ids()
    }

    pub fn count(&self) -> Result<u64> {
        self.repository.count()
    }
}

impl std::fmt::Debug for SecureStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureStore")
            .field("key_version", &self.key_version)
            .finish_non_exhaustive()
    }
}
