// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Liveness verification of the selfie step.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::AppError;

/// Decides whether a selfie shows a live person.
///
/// An `Err` means the check could not complete; `Ok(false)` means it ran
/// and rejected the capture.
#[async_trait]
pub trait LivenessVerifier: Send + Sync {
    async fn verify(&self, user_id: &str, selfie: &[u8]) -> Result<bool, AppError>;
}

/// Stub that waits a fixed delay and accepts every capture.
#[derive(Debug, Clone)]
pub struct DelayLivenessVerifier {
    delay: Duration,
}

impl DelayLivenessVerifier {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl LivenessVerifier for DelayLivenessVerifier {
    async fn verify(&self, user_id: &str, selfie: &[u8]) -> Result<bool, AppError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        tracing::debug!(user_id, bytes = selfie.len(), "Liveness check passed");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stub_accepts_after_delay() {
        let verifier = DelayLivenessVerifier::new(Duration::from_millis(20));
        let started = std::time::Instant::now();
        assert!(verifier.verify("u1", b"selfie").await.unwrap());
        assert!(started.elapsed() >= Duration::from_millis(20));
    }
}
