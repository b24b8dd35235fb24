// Error types for the generation guard
// Author: kelexine (https://github.com/kelexine)

use crate::upstream::{UpstreamError, UpstreamErrorKind};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Failures of the rate-limit, cache or usage stores.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Errors surfaced by the governed generation path.
///
/// Display strings are safe to show to end users. Provider detail is kept
/// in the error source and only ever logged.
#[derive(Error, Debug)]
pub enum GuardError {
    #[error("AI service temporarily unavailable")]
    UpstreamQuotaExhausted(#[source] UpstreamError),

    #[error("AI service is busy, try again in a few seconds")]
    UpstreamRateLimited(#[source] UpstreamError),

    #[error("AI service did not respond, try again shortly")]
    UpstreamUnavailable(#[source] UpstreamError),

    #[error("Content generation failed")]
    Generation(#[source] UpstreamError),

    #[error("Usage information is unavailable, try again shortly")]
    QuotaUnavailable(#[source] StoreError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Config parsing error: {0}")]
    ConfigParsing(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GuardError {
    /// Classify an upstream failure that survived the retry executor.
    pub fn from_upstream(err: UpstreamError) -> Self {
        match err.kind {
            UpstreamErrorKind::QuotaExhausted => GuardError::UpstreamQuotaExhausted(err),
            UpstreamErrorKind::Status(429) => GuardError::UpstreamRateLimited(err),
            _ if err.is_retryable() => GuardError::UpstreamUnavailable(err),
            _ => GuardError::Generation(err),
        }
    }

    /// Machine-readable reason code.
    pub fn reason_code(&self) -> &'static str {
        match self {
            GuardError::UpstreamQuotaExhausted(_) => "service_unavailable",
            GuardError::UpstreamRateLimited(_) => "upstream_rate_limited",
            GuardError::UpstreamUnavailable(_) => "upstream_unavailable",
            GuardError::Generation(_) => "generation_failed",
            GuardError::QuotaUnavailable(_) => "quota_unavailable",
            GuardError::InvalidRequest(_) => "invalid_request_error",
            GuardError::Config(_) | GuardError::ConfigParsing(_) => "configuration_error",
            _ => "api_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            GuardError::UpstreamQuotaExhausted(_)
            | GuardError::UpstreamUnavailable(_)
            | GuardError::QuotaUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GuardError::UpstreamRateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            GuardError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message for end users. Internal failures are masked entirely.
    pub fn public_message(&self) -> String {
        match self {
            GuardError::Store(_)
            | GuardError::Config(_)
            | GuardError::ConfigParsing(_)
            | GuardError::Io(_)
            | GuardError::Json(_) => "Internal error".to_string(),
            _ => self.to_string(),
        }
    }
}

// Convert GuardError to HTTP responses for Axum
impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(reason = self.reason_code(), error = ?self, "Request failed");
        }

        let body = json!({
            "type": "error",
            "error": {
                "type": self.reason_code(),
                "message": self.public_message(),
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, GuardError>;
