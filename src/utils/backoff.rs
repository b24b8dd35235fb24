// Exponential backoff with additive jitter
// Author: kelexine (https://github.com/kelexine)

use backoff::backoff::Backoff;
use rand::Rng;
use std::time::Duration;

/// Computes the delay before the next retry.
///
/// `delay(n) = min(base * 2^n + jitter, max)` where `n` is the 0-based index
/// of the attempt that just failed and `jitter` is drawn uniformly from
/// `[0, max_jitter)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            max_jitter: Duration::from_millis(1000),
        }
    }
}

impl BackoffPolicy {
    /// Deterministic part of the formula, with the jitter supplied by the caller.
    pub fn delay_with_jitter(&self, attempt: u32, jitter: Duration) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let exp_ms = base_ms.saturating_mul(factor);
        let total_ms = exp_ms.saturating_add(jitter.as_millis() as u64);
        Duration::from_millis(total_ms).min(self.max_delay)
    }

    /// Delay for `attempt` with a freshly drawn jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with_jitter(attempt, self.draw_jitter())
    }

    fn draw_jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
    }

    /// A stateful iterator over this policy's delays.
    pub fn iter(&self) -> JitteredBackoff {
        JitteredBackoff {
            policy: *self,
            attempt: 0,
        }
    }
}

/// Stateful view of a [`BackoffPolicy`], usable wherever the `backoff`
/// crate expects a [`Backoff`].
#[derive(Debug, Clone)]
pub struct JitteredBackoff {
    policy: BackoffPolicy,
    attempt: u32,
}

impl JitteredBackoff {
    /// Index of the attempt the next delay will be computed for.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

impl Backoff for JitteredBackoff {
    fn reset(&mut self) {
        self.attempt = 0;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        let delay = self.policy.delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        Some(delay)
    }
}
