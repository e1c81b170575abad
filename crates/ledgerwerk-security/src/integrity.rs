// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// SHA-256 hashing and hash-chain linkage.
//
// Chain hash input (UTF-8, concatenated in order, no separators):
//   1. previous chain hash (64 hex chars, or the genesis constant)
//   2. record signature as lowercase hex
//   3. user id
//   4. process id
//   5. unix timestamp in seconds, decimal

use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of `data` as a lowercase hex string.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute the chain hash binding a record to its predecessor.
pub fn chain_hash(
    prev_hash: &str,
    signature_hex: &str,
    user_id: &str,
    process_id: &str,
    unix_timestamp: i64,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prev_hash.as_bytes());
    hasher.update(signature_hex.as_bytes());
    hasher.update(user_id.as_bytes());
    hasher.update(process_id.as_bytes());
    hasher.update(unix_timestamp.to_string().as_bytes());
    hex::encode(hasher.finalize())
}
