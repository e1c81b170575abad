// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for sealing, signing, and chain hashing in the
// ledgerwerk-security crate.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use ledgerwerk_security::{
    CryptoEngine, KeyManager, LocalKeyManager, associated_data, chain_hash, verify_hex,
};

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

/// Seal-then-open round trip at typical justification sizes.
fn bench_seal_open(c: &mut Criterion) {
    let km = LocalKeyManager::new([7u8; 32], "bench").allow_all();
    let key = km
        .derive_data_encryption_key("P-bench", "reviewer")
        .expect("derive DEK");
    let engine = CryptoEngine::new();
    let aad = associated_data("P-bench", "reviewer", "reviewer_justification");

    let mut group = c.benchmark_group("aes_256_gcm_seal_open");
    for &(label, size) in &[("256 B", 256usize), ("4 KiB", 4 * 1024), ("64 KiB", 64 * 1024)] {
        let plaintext = vec![0x42u8; size];
        group.bench_function(label, |b| {
            b.iter(|| {
                let sealed = engine
                    .seal(black_box(&plaintext), &key, &aad)
                    .expect("seal failed");
                let opened = engine
                    .open(&sealed.ciphertext, &sealed.tag, &key, &sealed.nonce, &aad)
                    .expect("open failed");
                black_box(opened);
            });
        });
    }
    group.finish();
}

/// Ed25519 sign + verify over a sealed 4 KiB payload.
fn bench_sign_verify(c: &mut Criterion) {
    let km = LocalKeyManager::new([9u8; 32], "bench");
    let signer = km.user_signing_key("reviewer").expect("signing key");
    let public_key = signer.public_key_hex();
    let message = vec![0xABu8; 4 * 1024 + 28];

    c.bench_function("ed25519_sign_verify (4 KiB)", |b| {
        b.iter(|| {
            let sig = hex::encode(signer.sign(black_box(&message)));
            verify_hex(&public_key, &sig, &message).expect("verify failed");
        });
    });
}

/// One chain-hash step, as computed once per appended record.
fn bench_chain_hash(c: &mut Criterion) {
    let prev = "0".repeat(64);
    let sig = "ab".repeat(64);
    c.bench_function("chain_hash", |b| {
        b.iter(|| {
            black_box(chain_hash(
                black_box(&prev),
                black_box(&sig),
                "reviewer",
                "P-bench",
                1_760_000_000,
            ))
        });
    });
}

criterion_group!(benches, bench_seal_open, bench_sign_verify, bench_chain_hash);
criterion_main!(benches);
