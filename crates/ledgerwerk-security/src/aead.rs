// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Crypto engine: AES-256-GCM sealing and opening via `ring::aead`.
//
// The authentication tag is returned separately from the ciphertext body so
// each persisted field can be inspected on its own.  A fresh random nonce is
// drawn from the OS CSPRNG for every seal.  `open` fails closed: any change
// to ciphertext, tag, nonce, key, or associated data yields an error and no
// plaintext.

use ring::aead::{AES_256_GCM, Aad, LessSafeKey, Nonce, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;
use tracing::{debug, instrument};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;
/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;
/// AES-GCM tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Failures of the AEAD primitive.  Deliberately coarse: the caller learns
/// that an operation failed, never why at the byte level.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AeadError {
    #[error("random nonce generation failed")]
    Rng,
    #[error("invalid data encryption key")]
    Key,
    #[error("sealing failed")]
    Seal,
    #[error("nonce must be 12 bytes, got {0}")]
    NonceLength(usize),
    #[error("tag must be 16 bytes, got {0}")]
    TagLength(usize),
    #[error("authentication failed")]
    Authentication,
}

/// A data-encryption key.  Zeroised on drop, never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DataKey([u8; KEY_LEN]);

impl DataKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for DataKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DataKey(..)")
    }
}

/// Output of [`CryptoEngine::seal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedPayload {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
    pub tag: [u8; TAG_LEN],
}

/// Render the associated-data tuple `(process, user, record type)`.
///
/// A JSON array keeps the encoding unambiguous when identifiers contain
/// separator characters.
pub fn associated_data(process_id: &str, user_id: &str, record_type: &str) -> Vec<u8> {
    serde_json::json!([process_id, user_id, record_type])
        .to_string()
        .into_bytes()
}

/// Stateless AES-256-GCM engine.  Cheap to clone and share across threads.
#[derive(Clone)]
pub struct CryptoEngine {
    rng: SystemRandom,
}

impl Default for CryptoEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl CryptoEngine {
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }

    /// Seal `plaintext` under `key`, authenticating `aad`.
    #[instrument(skip_all, fields(plaintext_len = plaintext.len(), aad_len = aad.len()))]
    pub fn seal(
        &self,
        plaintext: &[u8],
        key: &DataKey,
        aad: &[u8],
    ) -> Result<SealedPayload, AeadError> {
        let mut nonce = [0u8; NONCE_LEN];
        self.rng.fill(&mut nonce).map_err(|_| AeadError::Rng)?;

        let sealing_key = less_safe_key(key)?;
        let mut in_out = plaintext.to_vec();
        let tag = sealing_key
            .seal_in_place_separate_tag(
                Nonce::assume_unique_for_key(nonce),
                Aad::from(aad),
                &mut in_out,
            )
            .map_err(|_| AeadError::Seal)?;

        let mut tag_bytes = [0u8; TAG_LEN];
        tag_bytes.copy_from_slice(tag.as_ref());

        debug!(ciphertext_len = in_out.len(), "payload sealed");
        Ok(SealedPayload {
            ciphertext: in_out,
            nonce,
            tag: tag_bytes,
        })
    }

    /// Open a sealed payload.  Returns the plaintext only if every input is
    /// authentic.  The buffer is wiped on drop, including the spare capacity
    /// that held the tag.
    #[instrument(skip_all, fields(ciphertext_len = ciphertext.len()))]
    pub fn open(
        &self,
        ciphertext: &[u8],
        tag: &[u8],
        key: &DataKey,
        nonce: &[u8],
        aad: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, AeadError> {
        if tag.len() != TAG_LEN {
            return Err(AeadError::TagLength(tag.len()));
        }
        let nonce_len = nonce.len();
        let nonce =
            Nonce::try_assume_unique_for_key(nonce).map_err(|_| AeadError::NonceLength(nonce_len))?;

        let opening_key = less_safe_key(key)?;
        let mut in_out = Zeroizing::new(Vec::with_capacity(ciphertext.len() + TAG_LEN));
        in_out.extend_from_slice(ciphertext);
        in_out.extend_from_slice(tag);

        let plaintext_len = opening_key
            .open_in_place(nonce, Aad::from(aad), in_out.as_mut_slice())
            .map_err(|_| AeadError::Authentication)?
            .len();
        in_out.truncate(plaintext_len);

        Ok(in_out)
    }
}

fn less_safe_key(key: &DataKey) -> Result<LessSafeKey, AeadError> {
    let unbound = UnboundKey::new(&AES_256_GCM, key.as_bytes()).map_err(|_| AeadError::Key)?;
    Ok(LessSafeKey::new(unbound))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> DataKey {
        DataKey::from_bytes([byte; KEY_LEN])
    }

    #[test]
    fn seal_then_open() {
        let engine = CryptoEngine::new();
        let aad = associated_data("P1", "alice", "note");
        let sealed = engine.seal(b"reviewer notes", &key(7), &aad).unwrap();

        assert_eq!(sealed.ciphertext.len(), b"reviewer notes".len());
        assert_ne!(&sealed.ciphertext[..], b"reviewer notes");

        let opened = engine
            .open(&sealed.ciphertext, &sealed.tag, &key(7), &sealed.nonce, &aad)
            .unwrap();
        assert_eq!(opened.as_slice(), b"reviewer notes");
    }

    #[test]
    fn opened_plaintext_excludes_tag_and_is_wiped_on_drop() {
        let engine = CryptoEngine::new();
        let sealed = engine.seal(b"panel minutes", &key(8), b"ad").unwrap();
        let opened: Zeroizing<Vec<u8>> = engine
            .open(&sealed.ciphertext, &sealed.tag, &key(8), &sealed.nonce, b"ad")
            .unwrap();
        assert_eq!(opened.len(), b"panel minutes".len());
        assert!(opened.capacity() >= opened.len() + TAG_LEN);
        assert_eq!(opened.as_slice(), b"panel minutes");
    }

    #[test]
    fn nonce_is_fresh_per_call() {
        let engine = CryptoEngine::new();
        let a = engine.seal(b"same", &key(1), b"ad").unwrap();
        let b = engine.seal(b"same", &key(1), b"ad").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn every_ciphertext_bit_is_authenticated() {
        let engine = CryptoEngine::new();
        let sealed = engine.seal(b"abc", &key(2), b"ad").unwrap();
        for byte in 0..sealed.ciphertext.len() {
            for bit in 0..8 {
                let mut tampered = sealed.ciphertext.clone();
                tampered[byte] ^= 1 << bit;
                assert_eq!(
                    engine.open(&tampered, &sealed.tag, &key(2), &sealed.nonce, b"ad"),
                    Err(AeadError::Authentication)
                );
            }
        }
    }

    #[test]
    fn tag_nonce_key_and_aad_are_bound() {
        let engine = CryptoEngine::new();
        let sealed = engine.seal(b"payload", &key(3), b"ad").unwrap();

        let mut tag = sealed.tag;
        tag[0] ^= 0x80;
        assert!(engine.open(&sealed.ciphertext, &tag, &key(3), &sealed.nonce, b"ad").is_err());

        let mut nonce = sealed.nonce;
        nonce[11] ^= 0x01;
        assert!(engine.open(&sealed.ciphertext, &sealed.tag, &key(3), &nonce, b"ad").is_err());

        assert!(engine.open(&sealed.ciphertext, &sealed.tag, &key(4), &sealed.nonce, b"ad").is_err());
        assert!(engine.open(&sealed.ciphertext, &sealed.tag, &key(3), &sealed.nonce, b"AD").is_err());
    }

    #[test]
    fn malformed_lengths_rejected() {
        let engine = CryptoEngine::new();
        let sealed = engine.seal(b"x", &key(5), b"").unwrap();
        assert_eq!(
            engine.open(&sealed.ciphertext, &sealed.tag[..8], &key(5), &sealed.nonce, b""),
            Err(AeadError::TagLength(8))
        );
        assert_eq!(
            engine.open(&sealed.ciphertext, &sealed.tag, &key(5), &sealed.nonce[..4], b""),
            Err(AeadError::NonceLength(4))
        );
    }

    #[test]
    fn empty_plaintext() {
        let engine = CryptoEngine::new();
        let sealed = engine.seal(b"", &key(6), b"ad").unwrap();
        assert!(sealed.ciphertext.is_empty());
        let opened = engine
            .open(&sealed.ciphertext, &sealed.tag, &key(6), &sealed.nonce, b"ad")
            .unwrap();
        assert!(opened.is_empty());
    }

    #[test]
    fn associated_data_is_unambiguous() {
        assert_ne!(
            associated_data("a:b", "c", "t"),
            associated_data("a", "b:c", "t")
        );
        assert_eq!(associated_data("P1", "u", "t"), br#"["P1","u","t"]"#.to_vec());
    }

    #[test]
    fn data_key_debug_is_redacted() {
        assert_eq!(format!("{:?}", key(9)), "DataKey(..)");
    }
}
