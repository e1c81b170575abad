// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Key management contract and a local reference implementation.
//
// The store never holds long-lived key material.  Every operation asks a
// `KeyManager` for exactly the key it needs and drops it afterwards.
// Authorization for reads is enforced here: a user who may not receive the
// data-encryption key for a process cannot open its records.

use std::collections::HashSet;
use std::sync::RwLock;

use ledgerwerk_core::error::{LedgerError, Result};
use ring::hkdf::{HKDF_SHA256, KeyType, Prk, Salt};
use tracing::{debug, info, instrument, warn};
use zeroize::Zeroizing;

use crate::aead::{DataKey, KEY_LEN};
use crate::integrity::hash_bytes;
use crate::signing::{SEED_LEN, SigningKey};

/// Key custody collaborator consumed by the store.
pub trait KeyManager: Send + Sync {
    /// Fail with [`LedgerError::AccessDenied`] unless `user_id` may use the
    /// keys of `process_id`.
    fn verify_key_access(&self, user_id: &str, process_id: &str) -> Result<()>;

    /// Data-encryption key scoped to one (process, user) pair.
    fn derive_data_encryption_key(&self, process_id: &str, user_id: &str) -> Result<DataKey>;

    /// The user's Ed25519 signing key.
    fn user_signing_key(&self, user_id: &str) -> Result<SigningKey>;

    /// Verifiable hash of the process key in use, recorded for provenance.
    fn process_key_hash(&self, process_id: &str) -> Result<String>;

    /// Identifier of the active system key.
    fn active_system_key_id(&self) -> Result<String>;
}

const LABEL_DEK: &[u8] = b"ledgerwerk/dek/v1";
const LABEL_SIGNING: &[u8] = b"ledgerwerk/signing/v1";
const LABEL_PROCESS: &[u8] = b"ledgerwerk/process/v1";

struct OutputLen(usize);

impl KeyType for OutputLen {
    fn len(&self) -> usize {
        self.0
    }
}

enum AccessPolicy {
    AllowAll,
    Grants(HashSet<(String, String)>),
}

/// Single-node key manager deriving every key from one master secret with
/// HKDF-SHA256.  Derivation is deterministic, so records stay readable across
/// restarts as long as the master secret and system key id are unchanged.
pub struct LocalKeyManager {
    prk: Prk,
    system_key_id: String,
    access: RwLock<AccessPolicy>,
}

impl LocalKeyManager {
    /// Create a manager that starts with no access grants.
    pub fn new(master_secret: [u8; KEY_LEN], system_key_id: impl Into<String>) -> Self {
        let master_secret = Zeroizing::new(master_secret);
        let system_key_id = system_key_id.into();
        let prk = Salt::new(HKDF_SHA256, system_key_id.as_bytes()).extract(&master_secret[..]);
        info!(%system_key_id, "local key manager ready");
        Self {
            prk,
            system_key_id,
            access: RwLock::new(AccessPolicy::Grants(HashSet::new())),
        }
    }

    /// Parse a 64-character hex master secret.
    pub fn from_hex(master_hex: &str, system_key_id: impl Into<String>) -> Result<Self> {
        let bytes = Zeroizing::new(
            hex::decode(master_hex.trim())
                .map_err(|_| LedgerError::MasterKey("master key is not valid hex".into()))?,
        );
        let master: [u8; KEY_LEN] = bytes.as_slice().try_into().map_err(|_| {
            LedgerError::MasterKey(format!("master key must be {KEY_LEN} bytes"))
        })?;
        Ok(Self::new(master, system_key_id))
    }

    /// Let every user access every process.  For single-tenant tooling such
    /// as the operator CLI, which only verifies.
    pub fn allow_all(self) -> Self {
        if let Ok(mut policy) = self.access.write() {
            *policy = AccessPolicy::AllowAll;
        }
        self
    }

    pub fn grant(&self, user_id: &str, process_id: &str) -> Result<()> {
        let mut policy = self.access.write().map_err(|_| poisoned())?;
        match &mut *policy {
            AccessPolicy::AllowAll => {}
            AccessPolicy::Grants(grants) => {
                grants.insert((user_id.to_owned(), process_id.to_owned()));
            }
        }
        debug!(user_id, process_id, "access granted");
        Ok(())
    }

    pub fn revoke(&self, user_id: &str, process_id: &str) -> Result<()> {
        let mut policy = self.access.write().map_err(|_| poisoned())?;
        if let AccessPolicy::Grants(grants) = &mut *policy {
            grants.remove(&(user_id.to_owned(), process_id.to_owned()));
        }
        debug!(user_id, process_id, "access revoked");
        Ok(())
    }

    fn derive(&self, label: &[u8], parts: &[&str], out: &mut [u8]) -> Result<()> {
        // Length-prefix every part so ("ab","c") and ("a","bc") differ.
        let mut info = Vec::with_capacity(label.len() + parts.len() * 36);
        info.extend_from_slice(label);
        for part in parts {
            info.extend_from_slice(&(part.len() as u32).to_be_bytes());
            info.extend_from_slice(part.as_bytes());
        }
        let info_slices = [info.as_slice()];
        self.prk
            .expand(&info_slices, OutputLen(out.len()))
            .and_then(|okm| okm.fill(out))
            .map_err(|_| LedgerError::KeyManager("key derivation failed".into()))
    }
}

impl KeyManager for LocalKeyManager {
    fn verify_key_access(&self, user_id: &str, process_id: &str) -> Result<()> {
        let policy = self.access.read().map_err(|_| poisoned())?;
        let allowed = match &*policy {
            AccessPolicy::AllowAll => true,
            AccessPolicy::Grants(grants) => {
                grants.contains(&(user_id.to_owned(), process_id.to_owned()))
            }
        };
        if allowed {
            Ok(())
        } else {
            warn!(user_id, process_id, "key access refused");
            Err(LedgerError::AccessDenied {
                user_id: user_id.to_owned(),
                process_id: process_id.to_owned(),
            })
        }
    }

    #[instrument(skip(self))]
    fn derive_data_encryption_key(&self, process_id: &str, user_id: &str) -> Result<DataKey> {
        self.verify_key_access(user_id, process_id)?;
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        self.derive(LABEL_DEK, &[process_id, user_id], &mut key[..])?;
        Ok(DataKey::from_bytes(*key))
    }

    #[instrument(skip(self))]
    fn user_signing_key(&self, user_id: &str) -> Result<SigningKey> {
        let mut seed = Zeroizing::new([0u8; SEED_LEN]);
        self.derive(LABEL_SIGNING, &[user_id], &mut seed[..])?;
        SigningKey::from_seed(&seed[..])
            .map_err(|e| LedgerError::KeyManager(format!("signing key: {e}")))
    }

    fn process_key_hash(&self, process_id: &str) -> Result<String> {
        let mut process_key = Zeroizing::new([0u8; KEY_LEN]);
        self.derive(LABEL_PROCESS, &[process_id], &mut process_key[..])?;
        Ok(hash_bytes(&process_key[..]))
    }

    fn active_system_key_id(&self) -> Result<String> {
        Ok(self.system_key_id.clone())
    }
}

fn poisoned() -> LedgerError {
    LedgerError::KeyManager("access policy lock poisoned".into())
}
