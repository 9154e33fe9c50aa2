// SPDX-License-Identifier: MIT
//
// Seedex: Network Entropy Exchange
// Copyright (c) 2025 Valer Bocan, PhD, CSSLP
// Email: valer.bocan@upt.ro
//
// Department of Computer and Information Technology
// Politehnica University of Timisoara
//
// https://github.com/vbocan/qrng-data-diode

//! Retry logic with exponential backoff and jitter
//!
//! Only network operations are retried. Pool I/O never is.

use crate::Result;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Initial backoff duration
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Add jitter to prevent thundering herd
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            ..Self::default()
        }
    }

    /// Execute operation with retry logic
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        let mut backoff = self.initial_backoff;

        loop {
            attempt += 1;

            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        debug!("Operation succeeded after {} attempts", attempt);
                    }
                    return Ok(result);
                }
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    warn!(
                        "Operation failed (attempt {}/{}): {}. Retrying after {:?}",
                        attempt, self.max_attempts, e, backoff
                    );

                    sleep(backoff).await;

                    backoff = Duration::from_secs_f64(
                        (backoff.as_secs_f64() * self.multiplier)
                            .min(self.max_backoff.as_secs_f64()),
                    );

                    if self.jitter {
                        backoff = self.add_jitter(backoff);
                    }
                }
                Err(e) => {
                    if attempt >= self.max_attempts {
                        warn!("Operation failed after {} attempts: {}", attempt, e);
                    }
                    return Err(e);
                }
            }
        }
    }

    fn add_jitter(&self, duration: Duration) -> Duration {
        use rand::Rng;
        let jitter_ms = rand::thread_rng().gen_range(0..=duration.as_millis() / 4);
        duration + Duration::from_millis(jitter_ms as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            jitter: false,
            ..RetryPolicy::new(max_attempts, Duration::from_millis(1))
        }
    }

    #[tokio::test]
    async fn test_retry_success() {
        let attempts = AtomicU32::new(0);

        let result = fast_policy(5)
            .execute(|| async {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::Timeout)
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausted() {
        let attempts = AtomicU32::new(0);

        let result = fast_policy(2)
            .execute(|| async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::Timeout)
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let attempts = AtomicU32::new(0);

        let result = fast_policy(5)
            .execute(|| async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::Validation("bad reply".to_string()))
            })
            .await;

        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
