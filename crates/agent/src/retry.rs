// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exponential backoff with jitter, and retryable-error classification for
//! the ingest client.

use std::time::Duration;

use rand::Rng;

/// Backoff parameters for the ingest client's retry loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry attempt `n`, `n` in `[0, max_retries)`.
    ///
    /// `min(base_delay * exponential_base^n, max_delay)`, optionally scaled
    /// by a uniform random factor in `[0.5, 1.0)`.
    pub fn delay_for_attempt(&self, n: u32) -> Duration {
        let unjittered = self.base_delay.as_secs_f64() * self.exponential_base.powi(n as i32);
        let capped = unjittered.min(self.max_delay.as_secs_f64());
        let scaled = if self.jitter {
            let factor = rand::rng().random_range(0.5..1.0);
            capped * factor
        } else {
            capped
        };
        Duration::from_secs_f64(scaled.max(0.0))
    }
}

/// HTTP status classification for the ingest retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 2xx/3xx.
    Success,
    /// 429 or >=500: retry.
    Retryable,
    /// 400, 401, 403, 422: fail fast.
    Permanent,
}

/// Classify an HTTP status code per the ingest endpoint's response contract.
pub fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=399 => StatusClass::Success,
        429 => StatusClass::Retryable,
        s if s >= 500 => StatusClass::Retryable,
        _ => StatusClass::Permanent,
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
