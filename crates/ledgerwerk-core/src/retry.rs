// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Error classification and retry policy.
//
// Failed verifications are never retried: running the same check again over
// the same bytes cannot change the answer.  Only storage and key-manager
// outages are transient.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::LedgerError;

/// Classification of errors for retry and alerting decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Storage or key-manager outage.  Safe to retry the whole operation.
    Transient,
    /// Programmer error, misconfiguration, or refused access.
    Permanent,
    /// Cryptographic or structural evidence of tampering.
    TamperEvidence,
}

/// Retry configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts.
    pub max_retries: u32,
    /// Base delay between retries (exponential backoff).
    pub base_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
        }
    }
}

/// Result of evaluating whether to retry.
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after this delay.
    RetryAfter(Duration),
    /// Do not retry.
    GiveUp(ErrorClass),
    /// Maximum retries exhausted.
    Exhausted,
}

/// Classify a `LedgerError`.
pub fn classify_error(err: &LedgerError) -> ErrorClass {
    match err {
        LedgerError::Persistence(_) => ErrorClass::Transient,
        LedgerError::KeyManager(_) => ErrorClass::Transient,
        LedgerError::Alert(_) => ErrorClass::Transient,

        LedgerError::SignatureVerificationFailed { .. } => ErrorClass::TamperEvidence,
        LedgerError::DecryptionFailed { .. } => ErrorClass::TamperEvidence,
        LedgerError::ChainBroken { .. } => ErrorClass::TamperEvidence,

        LedgerError::AccessDenied { .. } => ErrorClass::Permanent,
        LedgerError::Serialization(_) => ErrorClass::Permanent,
        LedgerError::InvalidPayload { .. } => ErrorClass::Permanent,
        LedgerError::Encryption(_) => ErrorClass::Permanent,
        LedgerError::RecordNotFound(_) => ErrorClass::Permanent,
        LedgerError::Config(_) => ErrorClass::Permanent,
        LedgerError::MasterKey(_) => ErrorClass::Permanent,
        LedgerError::InvalidArgument(_) => ErrorClass::Permanent,
        LedgerError::Scheduler(_) => ErrorClass::Permanent,

        LedgerError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::Interrupted
            | std::io::ErrorKind::WouldBlock => ErrorClass::Transient,
            _ => ErrorClass::Permanent,
        },
    }
}

/// Decide whether to retry based on the error class and attempt count.
pub fn should_retry(err: &LedgerError, attempt: u32, config: &RetryConfig) -> RetryDecision {
    match classify_error(err) {
        ErrorClass::TamperEvidence => {
            warn!("tamper evidence, never retried");
            RetryDecision::GiveUp(ErrorClass::TamperEvidence)
        }
        ErrorClass::Permanent => {
            info!("permanent error, not retrying");
            RetryDecision::GiveUp(ErrorClass::Permanent)
        }
        ErrorClass::Transient => {
            if attempt >= config.max_retries {
                warn!(attempt, max = config.max_retries, "retry limit exhausted");
                RetryDecision::Exhausted
            } else {
                let delay = compute_delay(attempt, config);
                debug!(attempt, delay_ms = delay.as_millis(), "scheduling retry");
                RetryDecision::RetryAfter(delay)
            }
        }
    }
}

/// delay = min(base * 2^attempt + jitter, max_delay), jitter in [0, base).
fn compute_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let base_ms = config.base_delay.as_millis() as u64;
    let exp_ms = base_ms.saturating_mul(1u64 << attempt.min(10));
    let total_ms = exp_ms.saturating_add(jitter(base_ms, attempt));
    let capped_ms = total_ms.min(config.max_delay.as_millis() as u64);
    Duration::from_millis(capped_ms)
}

fn jitter(base_ms: u64, attempt: u32) -> u64 {
    let hash = (attempt as u64 + 1).wrapping_mul(6364136223846793005);
    hash % base_ms.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_outage_is_transient() {
        let err = LedgerError::Persistence("database is locked".into());
        assert_eq!(classify_error(&err), ErrorClass::Transient);
    }

    #[test]
    fn verification_failures_are_tamper_evidence() {
        let err = LedgerError::SignatureVerificationFailed { record_id: 1 };
        assert_eq!(classify_error(&err), ErrorClass::TamperEvidence);
        assert_eq!(
            should_retry(&err, 0, &RetryConfig::default()),
            RetryDecision::GiveUp(ErrorClass::TamperEvidence)
        );
    }

    #[test]
    fn access_denied_not_retried() {
        let err = LedgerError::AccessDenied {
            user_id: "u".into(),
            process_id: "p".into(),
        };
        assert_eq!(
            should_retry(&err, 0, &RetryConfig::default()),
            RetryDecision::GiveUp(ErrorClass::Permanent)
        );
    }

    #[test]
    fn exhausts_after_max() {
        let config = RetryConfig {
            max_retries: 2,
            ..RetryConfig::default()
        };
        let err = LedgerError::Persistence("busy".into());
        assert!(matches!(
            should_retry(&err, 1, &config),
            RetryDecision::RetryAfter(_)
        ));
        assert_eq!(should_retry(&err, 2, &config), RetryDecision::Exhausted);
    }

    #[test]
    fn delay_is_capped() {
        let config = RetryConfig {
            max_retries: 20,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };
        assert!(compute_delay(9, &config) <= Duration::from_millis(500));
        assert!(compute_delay(0, &config) >= Duration::from_millis(100));
    }
}
