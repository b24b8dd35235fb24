//! Upstream AI provider boundary.
//!
//! The governance layer treats content generation as an opaque capability:
//! anything implementing [`ContentGenerator`] can be guarded. Failures are
//! reported as [`UpstreamError`], whose kind decides whether the retry
//! executor tries again.
//!
//! Author: kelexine (<https://github.com/kelexine>)

mod client;

pub use client::OpenAiGenerator;

use crate::cache::RequestType;
use crate::utils::retry::RetryClassify;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// What went wrong talking to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    /// Non-success HTTP status.
    Status(u16),
    /// Provider-side billing or quota exhaustion.
    QuotaExhausted,
    /// The attempt ran out of time.
    Timeout,
    /// Connection refused, reset or aborted.
    Connection,
    /// Deliberately cancelled by the caller.
    Cancelled,
    /// The provider answered but the body was unusable.
    InvalidResponse,
    Other,
}

impl fmt::Display for UpstreamErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamErrorKind::Status(code) => write!(f, "HTTP {}", code),
            UpstreamErrorKind::QuotaExhausted => f.write_str("quota exhausted"),
            UpstreamErrorKind::Timeout => f.write_str("timeout"),
            UpstreamErrorKind::Connection => f.write_str("connection error"),
            UpstreamErrorKind::Cancelled => f.write_str("cancelled"),
            UpstreamErrorKind::InvalidResponse => f.write_str("invalid response"),
            UpstreamErrorKind::Other => f.write_str("upstream error"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct UpstreamError {
    pub kind: UpstreamErrorKind,
    pub message: String,
}

impl UpstreamError {
    pub fn new(kind: UpstreamErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn status(code: u16, message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::Status(code), message)
    }

    pub fn quota_exhausted(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::QuotaExhausted, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::Connection, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::Cancelled, message)
    }

    /// The HTTP status, if the failure carried one.
    pub fn status_code(&self) -> Option<u16> {
        match self.kind {
            UpstreamErrorKind::Status(code) => Some(code),
            _ => None,
        }
    }

    /// 429/500/502/503/504, timeouts and connection failures are transient.
    /// Everything else, including cancellation and quota exhaustion, is terminal.
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            UpstreamErrorKind::Status(code) => is_retryable_status(code),
            UpstreamErrorKind::Timeout | UpstreamErrorKind::Connection => true,
            _ => false,
        }
    }
}

/// Determine if an HTTP status code is retryable
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

impl RetryClassify for UpstreamError {
    fn is_retryable(&self) -> bool {
        UpstreamError::is_retryable(self)
    }

    fn attempt_timed_out(after: Duration) -> Self {
        Self::new(
            UpstreamErrorKind::Timeout,
            format!("attempt exceeded {}ms", after.as_millis()),
        )
    }
}

/// Input handed to the generator for one governed request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationPrompt {
    pub request_type: RequestType,
    pub input: Value,
}

/// The opaque `generate(input) -> content` capability being guarded.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, prompt: &GenerationPrompt) -> Result<Value, UpstreamError>;
}
