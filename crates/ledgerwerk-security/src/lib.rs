// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// ledgerwerk-security: cryptographic foundation for the audit store.
//
// Provides the AES-256-GCM crypto engine, Ed25519 record signatures, SHA-256
// chain hashing, and the key-manager contract the store consumes.

pub mod aead;
pub mod integrity;
pub mod keys;
pub mod signing;

// PUBLIC API: Re-export core security primitives
pub use aead::{AeadError, CryptoEngine, DataKey, SealedPayload, associated_data};
pub use integrity::{chain_hash, hash_bytes};
pub use keys::{KeyManager, LocalKeyManager};
pub use signing::{SignatureError, SigningKey, verify_hex};
