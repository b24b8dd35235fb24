// Request and response models for governed generation
// Author: kelexine (https://github.com/kelexine)

use crate::cache::RequestType;
use crate::rate_limit::{Dimension, RateDecision};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// One inbound generation request, already authenticated.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub user_id: String,
    /// `None` when the caller's address is unknown; the IP check is skipped.
    pub client_ip: Option<String>,
    pub request_type: RequestType,
    pub input: Value,
}

impl GenerationRequest {
    pub fn new(user_id: impl Into<String>, request_type: RequestType, input: Value) -> Self {
        Self {
            user_id: user_id.into(),
            client_ip: None,
            request_type,
            input,
        }
    }

    pub fn with_client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = Some(ip.into());
        self
    }

    /// Text the cache key is derived from. String inputs are used as is,
    /// anything else as its compact JSON rendering.
    pub fn cache_content(&self) -> String {
        match &self.input {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Outcome of a governed call that was not an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GovernedResponse {
    Generated(GeneratedContent),
    Denied(Denial),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedContent {
    pub payload: Value,
    pub metadata: GenerationMetadata,
    /// The tighter of the user and IP decisions for this request.
    #[serde(skip)]
    pub rate_limit: RateDecision,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationMetadata {
    pub generation_id: Uuid,
    pub request_type: RequestType,
    pub duration_ms: u64,
    pub generated_at: DateTime<Utc>,
    /// Upstream attempts made; zero for a cache hit.
    pub attempts: u32,
    pub cached: bool,
    pub cache_key: String,
}

/// A policy refusal. Expected control flow, never retried.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Denial {
    pub reason: DenialReason,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl Denial {
    pub fn reason_code(&self) -> &'static str {
        self.reason.code()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DenialReason {
    RateLimited {
        dimension: Dimension,
        reset_at: DateTime<Utc>,
    },
    PlanLimitReached {
        limit: u64,
        used: u64,
    },
}

impl DenialReason {
    pub fn code(&self) -> &'static str {
        match self {
            DenialReason::RateLimited { .. } => "rate_limited",
            DenialReason::PlanLimitReached { .. } => "plan_limit_reached",
        }
    }
}

/// Rows removed by one maintenance sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub cache_entries_removed: u64,
    pub rate_limit_entries_removed: u64,
}
