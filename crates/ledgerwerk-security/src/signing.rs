// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Ed25519 record signatures via `ring::signature`.
//
// Signatures cover the sealed bytes (ciphertext || nonce || tag), so a record
// can be verified without its data-encryption key.  Keys and signatures are
// persisted as lowercase hex.

use ring::rand::SystemRandom;
use ring::signature::{ED25519, Ed25519KeyPair, KeyPair, UnparsedPublicKey};
use thiserror::Error;
use tracing::{debug, instrument};
use zeroize::Zeroizing;

/// Ed25519 seed length in bytes.
pub const SEED_LEN: usize = 32;
/// Ed25519 public key length in bytes.
pub const PUBLIC_KEY_LEN: usize = 32;
/// Ed25519 signature length in bytes.
pub const SIGNATURE_LEN: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("key material rejected")]
    KeyRejected,
    #[error("{field} is not valid hex")]
    Encoding { field: &'static str },
    #[error("{field} must be {expected} bytes, got {actual}")]
    Length {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("signature does not verify")]
    Invalid,
}

/// A user's Ed25519 signing key.
pub struct SigningKey {
    key_pair: Ed25519KeyPair,
}

impl SigningKey {
    /// Build a key from a 32-byte seed.  The seed buffer is not retained.
    pub fn from_seed(seed: &[u8]) -> Result<Self, SignatureError> {
        if seed.len() != SEED_LEN {
            return Err(SignatureError::Length {
                field: "seed",
                expected: SEED_LEN,
                actual: seed.len(),
            });
        }
        let key_pair =
            Ed25519KeyPair::from_seed_unchecked(seed).map_err(|_| SignatureError::KeyRejected)?;
        Ok(Self { key_pair })
    }

    /// Generate a fresh random key using the OS CSPRNG.
    #[instrument]
    pub fn generate() -> Result<Self, SignatureError> {
        let rng = SystemRandom::new();
        let pkcs8 = Zeroizing::new(
            Ed25519KeyPair::generate_pkcs8(&rng)
                .map_err(|_| SignatureError::KeyRejected)?
                .as_ref()
                .to_vec(),
        );
        let key_pair =
            Ed25519KeyPair::from_pkcs8(&pkcs8).map_err(|_| SignatureError::KeyRejected)?;
        debug!("Ed25519 key pair generated");
        Ok(Self { key_pair })
    }

    pub fn public_key_bytes(&self) -> &[u8] {
        self.key_pair.public_key().as_ref()
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.key_pair.sign(message).as_ref().to_vec()
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

/// Verify a hex-encoded Ed25519 signature over `message` against a
/// hex-encoded public key.
pub fn verify_hex(
    public_key_hex: &str,
    signature_hex: &str,
    message: &[u8],
) -> Result<(), SignatureError> {
    let public_key = decode_exact(public_key_hex, "public key", PUBLIC_KEY_LEN)?;
    let signature = decode_exact(signature_hex, "signature", SIGNATURE_LEN)?;
    verify(&public_key, &signature, message)
}

/// Verify a raw Ed25519 signature.
pub fn verify(public_key: &[u8], signature: &[u8], message: &[u8]) -> Result<(), SignatureError> {
    UnparsedPublicKey::new(&ED25519, public_key)
        .verify(message, signature)
        .map_err(|_| SignatureError::Invalid)
}

fn decode_exact(
    value: &str,
    field: &'static str,
    expected: usize,
) -> Result<Vec<u8>, SignatureError> {
    let bytes = hex::decode(value).map_err(|_| SignatureError::Encoding { field })?;
    if bytes.len() != expected {
        return Err(SignatureError::Length {
            field,
            expected,
            actual: bytes.len(),
        });
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let key = SigningKey::generate().expect("key generation failed");
        let message = b"ciphertext||nonce||tag";
        let signature = hex::encode(key.sign(message));

        assert_eq!(key.public_key_bytes().len(), PUBLIC_KEY_LEN);
        verify_hex(&key.public_key_hex(), &signature, message).expect("signature must verify");
    }

    #[test]
    fn seed_is_deterministic() {
        let a = SigningKey::from_seed(&[11u8; SEED_LEN]).unwrap();
        let b = SigningKey::from_seed(&[11u8; SEED_LEN]).unwrap();
        assert_eq!(a.public_key_hex(), b.public_key_hex());
        assert_eq!(a.sign(b"m"), b.sign(b"m"));
    }

    #[test]
    fn flipped_signature_bit_fails() {
        let key = SigningKey::from_seed(&[3u8; SEED_LEN]).unwrap();
        let mut sig = key.sign(b"data");
        sig[10] ^= 0x04;
        assert_eq!(
            verify_hex(&key.public_key_hex(), &hex::encode(sig), b"data"),
            Err(SignatureError::Invalid)
        );
    }

    #[test]
    fn other_key_fails() {
        let signer = SigningKey::from_seed(&[1u8; SEED_LEN]).unwrap();
        let other = SigningKey::from_seed(&[2u8; SEED_LEN]).unwrap();
        let sig = hex::encode(signer.sign(b"data"));
        assert!(verify_hex(&other.public_key_hex(), &sig, b"data").is_err());
    }

    #[test]
    fn bad_hex_and_lengths_rejected() {
        let key = SigningKey::from_seed(&[4u8; SEED_LEN]).unwrap();
        assert_eq!(
            verify_hex("zz", "00", b""),
            Err(SignatureError::Encoding { field: "public key" })
        );
        assert!(matches!(
            verify_hex(&key.public_key_hex(), "abcd", b""),
            Err(SignatureError::Length { field: "signature", .. })
        ));
        assert!(SigningKey::from_seed(&[0u8; 16]).is_err());
    }

    #[test]
    fn debug_shows_public_half_only() {
        let key = SigningKey::from_seed(&[5u8; SEED_LEN]).unwrap();
        let rendered = format!("{key:?}");
        assert!(rendered.contains(&key.public_key_hex()));
    }
}
