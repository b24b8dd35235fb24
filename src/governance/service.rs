// Governed generation: rate check, quota check, cache, guarded upstream call
// Author: kelexine (https://github.com/kelexine)

use super::models::{
    Denial, DenialReason, GeneratedContent, GenerationMetadata, GenerationRequest,
    GovernedResponse,
};
use crate::cache::{RequestType, ResponseCache};
use crate::config::AppConfig;
use crate::error::{GuardError, Result};
use crate::metrics;
use crate::rate_limit::{Dimension, IdentityKey, RateCategory, RateDecision, RateLimiter};
use crate::store::Stores;
use crate::upstream::{ContentGenerator, GenerationPrompt, OpenAiGenerator};
use crate::usage::{MemoryUsageLedger, PlanLimit, UsageLedger};
use crate::utils::clock::{Clock, SystemClock};
use crate::utils::logging::redact_identity;
use crate::utils::retry::{RetryExecutor, RetryPolicy};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Guard between inbound generation requests and the upstream provider.
///
/// Steps run strictly in order: user rate check, IP rate check, plan quota,
/// cache lookup, guarded upstream call, then cache write and usage
/// accounting. The policy steps fail fast without side effects. Only the
/// upstream call is retried, and failures after it never fail the request.
pub struct GovernedGenerationService {
    limiter: RateLimiter,
    cache: ResponseCache,
    retry: RetryExecutor,
    usage: Arc<dyn UsageLedger>,
    generator: Arc<dyn ContentGenerator>,
    clock: Arc<dyn Clock>,
}

impl GovernedGenerationService {
    /// Assemble the service from its collaborators, taking policies from `config`.
    pub fn new(
        config: &AppConfig,
        stores: Stores,
        usage: Arc<dyn UsageLedger>,
        generator: Arc<dyn ContentGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            limiter: RateLimiter::new(
                stores.rate_limits,
                clock.clone(),
                config.rate_limit.clone(),
            ),
            cache: ResponseCache::new(stores.cache, clock.clone(), config.cache.clone()),
            retry: RetryExecutor::new(RetryPolicy::from(&config.retry)),
            usage,
            generator,
            clock,
        }
    }

    /// Production wiring: configured store, HTTP generator, in-process ledger.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let stores = Stores::open(&config.store, config.cache.max_entries).await?;
        let generator = Arc::new(OpenAiGenerator::new(&config.upstream)?);
        let usage = Arc::new(MemoryUsageLedger::new(config.plans.clone(), clock.clone()));
        Ok(Self::new(config, stores, usage, generator, clock))
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Run one request through the guard.
    ///
    /// Policy refusals come back as [`GovernedResponse::Denied`]. Errors are
    /// reserved for an unreadable usage ledger and upstream failures that
    /// survived retrying.
    pub async fn generate(&self, request: GenerationRequest) -> Result<GovernedResponse> {
        let started = Instant::now();
        let request_type = request.request_type;

        if request.user_id.trim().is_empty() {
            return Err(GuardError::InvalidRequest("user id is required".to_string()));
        }

        // Phase 1: rate limits, user then IP
        let user_decision = self
            .limiter
            .check(&IdentityKey::user(&request.user_id), RateCategory::Generation)
            .await;
        if !user_decision.allowed {
            return Ok(self.rate_denied(Dimension::User, user_decision, &request));
        }

        let mut rate_limit = user_decision;
        if let Some(ip) = &request.client_ip {
            let ip_decision = self
                .limiter
                .check(&IdentityKey::ip(ip), RateCategory::Generation)
                .await;
            if !ip_decision.allowed {
                return Ok(self.rate_denied(Dimension::Ip, ip_decision, &request));
            }
            if ip_decision.remaining < rate_limit.remaining {
                rate_limit = ip_decision;
            }
        }

        // Phase 2: plan quota
        if let Some(denial) = self.check_quota(&request.user_id).await? {
            metrics::record_governed_request(request_type.as_str(), "plan_limited");
            return Ok(GovernedResponse::Denied(denial));
        }

        // Phase 3: cache lookup
        let content = request.cache_content();
        let cache_key = self.cache.cache_key(&content, request_type);
        if let Some(payload) = self.cache.get(&content, request_type).await {
            debug!(cache_key = %cache_key, "Serving cached generation");
            metrics::record_governed_request(request_type.as_str(), "cached");
            return Ok(GovernedResponse::Generated(GeneratedContent {
                payload,
                metadata: self.metadata(request_type, started, 0, true, cache_key),
                rate_limit,
            }));
        }

        // Phase 4: guarded upstream call
        let prompt = GenerationPrompt {
            request_type,
            input: request.input.clone(),
        };
        let generator = &self.generator;
        let prompt_ref = &prompt;
        let upstream_started = Instant::now();
        let outcome = self
            .retry
            .execute(request_type.as_str(), move |_| generator.generate(prompt_ref))
            .await;
        metrics::record_upstream_duration(
            request_type.as_str(),
            upstream_started.elapsed().as_secs_f64(),
        );

        let completed = match outcome {
            Ok(completed) => completed,
            Err(e) => {
                let err = GuardError::from_upstream(e);
                error!(
                    request_type = %request_type,
                    reason = err.reason_code(),
                    error = ?err,
                    "Generation failed"
                );
                metrics::record_governed_request(request_type.as_str(), "failed");
                return Err(err);
            }
        };

        // Phase 5: persist and account, neither may fail the request
        self.cache
            .set(&content, request_type, completed.value.clone(), None)
            .await;
        if let Err(e) = self.usage.increment_usage(&request.user_id).await {
            warn!(
                user = %redact_identity(&request.user_id),
                error = %e,
                "Failed to record usage"
            );
        }

        let metadata = self.metadata(
            request_type,
            started,
            completed.attempts,
            false,
            cache_key,
        );
        info!(
            generation_id = %metadata.generation_id,
            request_type = %request_type,
            attempts = metadata.attempts,
            duration_ms = metadata.duration_ms,
            "Generated content"
        );
        metrics::record_governed_request(request_type.as_str(), "generated");

        Ok(GovernedResponse::Generated(GeneratedContent {
            payload: completed.value,
            metadata,
            rate_limit,
        }))
    }

    /// `Some(denial)` if the user's plan ceiling is already used up.
    async fn check_quota(&self, user_id: &str) -> Result<Option<Denial>> {
        let limit = match self
            .usage
            .plan_limit(user_id)
            .await
            .map_err(GuardError::QuotaUnavailable)?
        {
            PlanLimit::Unlimited => return Ok(None),
            PlanLimit::Monthly(limit) => limit,
        };

        let used = self
            .usage
            .current_usage(user_id)
            .await
            .map_err(GuardError::QuotaUnavailable)?;
        if !PlanLimit::Monthly(limit).is_reached(used) {
            return Ok(None);
        }

        info!(user = %redact_identity(user_id), used, limit, "Plan limit reached");
        Ok(Some(Denial {
            reason: DenialReason::PlanLimitReached { limit, used },
            message: format!(
                "Monthly generation limit reached ({}/{}). Upgrade your plan to continue.",
                used, limit
            ),
            retry_after_secs: None,
        }))
    }

    fn rate_denied(
        &self,
        dimension: Dimension,
        decision: RateDecision,
        request: &GenerationRequest,
    ) -> GovernedResponse {
        metrics::record_governed_request(request.request_type.as_str(), "rate_limited");
        let retry_after = decision.retry_after_secs(self.clock.now());
        GovernedResponse::Denied(Denial {
            message: decision.message.unwrap_or_else(|| {
                format!("Too many requests. Try again in {} seconds.", retry_after)
            }),
            reason: DenialReason::RateLimited {
                dimension,
                reset_at: decision.reset_at,
            },
            retry_after_secs: Some(retry_after),
        })
    }

    fn metadata(
        &self,
        request_type: RequestType,
        started: Instant,
        attempts: u32,
        cached: bool,
        cache_key: String,
    ) -> GenerationMetadata {
        GenerationMetadata {
            generation_id: Uuid::new_v4(),
            request_type,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            generated_at: self.clock.now(),
            attempts,
            cached,
            cache_key,
        }
    }
}
