// Retry executor with per-attempt timeout and jittered exponential backoff
// Author: kelexine (https://github.com/kelexine)

use crate::config::RetryConfig;
use crate::utils::backoff::BackoffPolicy;
use backoff::backoff::Backoff;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Errors the executor knows how to classify.
pub trait RetryClassify: Display {
    /// Whether another attempt could plausibly succeed.
    fn is_retryable(&self) -> bool;

    /// The error reported when an attempt exceeds its timeout.
    fn attempt_timed_out(after: Duration) -> Self;
}

/// Retry parameters for one call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts is `max_retries + 1`.
    pub max_retries: u32,
    pub attempt_timeout: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            attempt_timeout: Duration::from_millis(45_000),
            backoff: BackoffPolicy::default(),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            attempt_timeout: Duration::from_millis(config.attempt_timeout_ms),
            backoff: BackoffPolicy {
                base_delay: Duration::from_millis(config.base_delay_ms),
                max_delay: Duration::from_millis(config.max_delay_ms),
                max_jitter: Duration::from_millis(config.max_jitter_ms),
            },
        }
    }
}

/// Passed to the operation on every attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    /// 0-based attempt index.
    pub number: u32,
    /// Budget for this attempt. The attempt future is dropped when it runs out.
    pub timeout: Duration,
}

/// Successful result plus the number of attempts it took.
#[derive(Debug, Clone, PartialEq)]
pub struct Completed<T> {
    pub value: T,
    pub attempts: u32,
}

/// Runs an async operation under a [`RetryPolicy`].
///
/// - Each attempt is bounded by `attempt_timeout`; a timeout is retryable.
/// - Terminal errors are returned on first occurrence.
/// - After `max_retries + 1` failed attempts the last error is returned as is.
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn execute<F, Fut, T, E>(
        &self,
        operation_name: &str,
        mut operation: F,
    ) -> Result<Completed<T>, E>
    where
        F: FnMut(Attempt) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryClassify,
    {
        let timeout = self.policy.attempt_timeout;
        let mut backoff = self.policy.backoff.iter();
        let mut number = 0u32;

        loop {
            let attempt = Attempt { number, timeout };
            let result = match tokio::time::timeout(timeout, operation(attempt)).await {
                Ok(result) => result,
                Err(_) => {
                    crate::metrics::record_retry_attempt("timeout");
                    Err(E::attempt_timed_out(timeout))
                }
            };

            let err = match result {
                Ok(value) => {
                    crate::metrics::record_retry_attempt("success");
                    if number > 0 {
                        debug!(operation = operation_name, attempts = number + 1, "Succeeded after retry");
                    }
                    return Ok(Completed {
                        value,
                        attempts: number + 1,
                    });
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                crate::metrics::record_retry_attempt("terminal");
                debug!(operation = operation_name, attempt = number, "Non-retryable error: {}", err);
                return Err(err);
            }
            crate::metrics::record_retry_attempt("retryable");

            if number >= self.policy.max_retries {
                error!(
                    operation = operation_name,
                    attempts = number + 1,
                    "Retries exhausted, last error: {}",
                    err
                );
                return Err(err);
            }

            let delay = backoff
                .next_backoff()
                .unwrap_or(self.policy.backoff.max_delay);
            warn!(
                operation = operation_name,
                attempt = number,
                delay_ms = delay.as_millis() as u64,
                "Attempt failed, retrying: {}",
                err
            );
            tokio::time::sleep(delay).await;
            number += 1;
        }
    }
}
