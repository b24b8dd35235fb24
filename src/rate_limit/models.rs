// Rate limiting identities, categories and decisions
// Author: kelexine (https://github.com/kelexine)

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Which identity dimension a counter belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    User,
    Ip,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::User => "user",
            Dimension::Ip => "ip",
        }
    }
}

/// A rate-limit subject, rendered as `user:<id>` or `ip:<addr>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    User(String),
    Ip(String),
}

impl IdentityKey {
    pub fn user(id: impl Into<String>) -> Self {
        IdentityKey::User(id.into())
    }

    pub fn ip(addr: impl Into<String>) -> Self {
        IdentityKey::Ip(addr.into())
    }

    pub fn dimension(&self) -> Dimension {
        match self {
            IdentityKey::User(_) => Dimension::User,
            IdentityKey::Ip(_) => Dimension::Ip,
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityKey::User(id) => write!(f, "user:{}", id),
            IdentityKey::Ip(addr) => write!(f, "ip:{}", addr),
        }
    }
}

/// Operation class; each has its own ceilings and its own counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RateCategory {
    /// Paid AI generation calls.
    Generation,
    /// Scraping-class operations.
    Scraping,
    /// General API traffic.
    Api,
}

impl RateCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateCategory::Generation => "generation",
            RateCategory::Scraping => "scraping",
            RateCategory::Api => "api",
        }
    }
}

impl fmt::Display for RateCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted fixed-window counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub identity_key: String,
    pub count: u32,
    pub window_reset_at: DateTime<Utc>,
}

/// Result of one atomic increment-or-initialize-window call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowHit {
    /// Whether this request was counted against the window.
    pub admitted: bool,
    /// State of the window after the call.
    pub entry: RateLimitEntry,
}

/// Answer to "is this identity allowed right now". A denial is a regular
/// value, never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RateDecision {
    /// Whole seconds until the window resets, rounded up.
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        let millis = (self.reset_at - now).num_milliseconds();
        if millis <= 0 {
            0
        } else {
            (millis as u64).div_ceil(1000)
        }
    }
}
