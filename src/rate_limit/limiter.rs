// Fixed-window rate limiter over a shared counter store
// Author: kelexine (https://github.com/kelexine)

use super::models::{IdentityKey, RateCategory, RateDecision};
use crate::config::{RateLimitConfig, RateLimitPolicy};
use crate::error::StoreError;
use crate::metrics;
use crate::store::RateLimitStore;
use crate::utils::clock::{deadline, span_secs, Clock};
use crate::utils::logging::redact_identity;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-identity fixed-window limiter.
///
/// Each check is one atomic store call, so concurrent requests for the same
/// identity can never push a window past its ceiling. Windows are fixed, not
/// sliding: up to twice the ceiling can pass across a window boundary.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn RateLimitStore>,
        clock: Arc<dyn Clock>,
        config: RateLimitConfig,
    ) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Ceiling and window that apply to `identity` in `category`.
    pub fn policy_for(&self, identity: &IdentityKey, category: RateCategory) -> RateLimitPolicy {
        match (category, identity) {
            (RateCategory::Generation, IdentityKey::User(_)) => self.config.user,
            (RateCategory::Generation, IdentityKey::Ip(_)) => self.config.ip,
            (RateCategory::Scraping, _) => self.config.scraping,
            (RateCategory::Api, _) => self.config.api,
        }
    }

    /// Count one request for `identity` and say whether it may proceed.
    ///
    /// A denial leaves the window untouched. If the store is unreachable the
    /// configured `fail_open` policy decides.
    pub async fn check(&self, identity: &IdentityKey, category: RateCategory) -> RateDecision {
        let policy = self.policy_for(identity, category);
        let window = window_duration(&policy);
        let dimension = identity.dimension().as_str();
        let now = self.clock.now();

        if policy.max_requests == 0 {
            metrics::record_rate_decision(dimension, "denied");
            return denied(deadline(now, window), now);
        }

        let key = format!("{}:{}", category, identity);
        match self.store.hit(&key, policy.max_requests, window, now).await {
            Ok(hit) if hit.admitted => {
                let remaining = policy.max_requests.saturating_sub(hit.entry.count);
                debug!(
                    identity = %redact_identity(&identity.to_string()),
                    %category,
                    remaining,
                    "Rate limit check passed"
                );
                metrics::record_rate_decision(dimension, "allowed");
                RateDecision {
                    allowed: true,
                    remaining,
                    reset_at: hit.entry.window_reset_at,
                    message: None,
                }
            }
            Ok(hit) => {
                info!(
                    identity = %redact_identity(&identity.to_string()),
                    %category,
                    reset_at = %hit.entry.window_reset_at,
                    "Rate limit exceeded"
                );
                metrics::record_rate_decision(dimension, "denied");
                denied(hit.entry.window_reset_at, now)
            }
            Err(e) if self.config.fail_open => {
                warn!(
                    identity = %redact_identity(&identity.to_string()),
                    %category,
                    error = %e,
                    "Rate limit store unavailable, admitting request"
                );
                metrics::record_rate_decision(dimension, "fail_open");
                RateDecision {
                    allowed: true,
                    remaining: policy.max_requests.saturating_sub(1),
                    reset_at: deadline(now, window),
                    message: None,
                }
            }
            Err(e) => {
                warn!(
                    identity = %redact_identity(&identity.to_string()),
                    %category,
                    error = %e,
                    "Rate limit store unavailable, refusing request"
                );
                metrics::record_rate_decision(dimension, "fail_closed");
                denied(deadline(now, window), now)
            }
        }
    }

    /// Remove counters whose window has closed.
    pub async fn sweep_expired(&self) -> Result<u64, StoreError> {
        let removed = self.store.sweep_expired(self.clock.now()).await?;
        if removed > 0 {
            debug!(removed, "Swept closed rate-limit windows");
        }
        Ok(removed)
    }
}

fn window_duration(policy: &RateLimitPolicy) -> Duration {
    span_secs(policy.window_secs)
}

fn denied(reset_at: DateTime<Utc>, now: DateTime<Utc>) -> RateDecision {
    let mut decision = RateDecision {
        allowed: false,
        remaining: 0,
        reset_at,
        message: None,
    };
    decision.message = Some(format!(
        "Too many requests. Try again in {} seconds.",
        decision.retry_after_secs(now).max(1)
    ));
    decision
}
