//! Structured logging and privacy-focused trace utilities.
//!
//! This module configures the `tracing` ecosystem for the application,
//! supporting multiple output formats and providing utilities that keep
//! caller identities and provider credentials out of log sinks.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use crate::config::LoggingConfig;
use crate::error::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static REDACT_IDENTITIES: AtomicBool = AtomicBool::new(true);

/// Initializes the global tracing subscriber for the application.
///
/// Supports two output formats:
/// - `json`: Structured JSON logs for production ingestion.
/// - `pretty` (default): Human-readable, colorized output for development.
///
/// Log levels are controlled via the `RUST_LOG` environment variable or
/// the provided `LoggingConfig`.
pub fn init(config: &LoggingConfig) -> Result<()> {
    REDACT_IDENTITIES.store(config.redact_identities, Ordering::Relaxed);

    // Configure filter from environment or config file
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

/// Masks an identity key (`user:<id>`, `ip:<addr>`) or a bare id for logging.
///
/// The dimension prefix survives, as do the first two characters of the
/// value, so log lines stay correlatable without exposing who made the call.
/// Returns the input unchanged when redaction is switched off.
pub fn redact_identity(identity: &str) -> String {
    if !REDACT_IDENTITIES.load(Ordering::Relaxed) {
        return identity.to_string();
    }
    mask_identity(identity)
}

fn mask_identity(identity: &str) -> String {
    let (prefix, value) = match identity.split_once(':') {
        Some((dim @ ("user" | "ip"), rest)) => (Some(dim), rest),
        _ => (None, identity),
    };

    let visible: String = value.chars().take(2).collect();
    let masked = if value.chars().count() <= 2 {
        "***".to_string()
    } else {
        format!("{}***", visible)
    };

    match prefix {
        Some(dim) => format!("{}:{}", dim, masked),
        None => masked,
    }
}

/// Sanitizes provider credentials from log messages.
///
/// Replaces every `sk-` style API key with a `\[REDACTED_API_KEY\]`
/// placeholder. Upstream error bodies sometimes echo the key back, so
/// they pass through here before being logged.
pub fn sanitize(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find("sk-") {
        result.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        // "task-", "disk-" and friends are not keys
        if result.chars().last().is_some_and(|c| c.is_ascii_alphanumeric()) {
            result.push_str("sk-");
            rest = &tail[3..];
            continue;
        }
        let end = tail
            .find(|c: char| c.is_whitespace() || c == '"' || c == '\'' || c == ',')
            .unwrap_or(tail.len());
        result.push_str("[REDACTED_API_KEY]");
        rest = &tail[end..];
    }
    result.push_str(rest);

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_keeps_dimension() {
        assert_eq!(mask_identity("user:alice"), "user:al***");
        assert_eq!(mask_identity("ip:203.0.113.7"), "ip:20***");
        assert_eq!(mask_identity("u1"), "***");
    }

    #[test]
    fn test_sanitize_api_key() {
        let input = r#"{"error": "Incorrect API key provided: sk-proj-abc123XYZ", "key2": 'sk-other'}"#;
        let output = sanitize(input);
        assert!(output.contains("[REDACTED_API_KEY]"));
        assert!(!output.contains("sk-proj-abc123XYZ"));
        assert!(!output.contains("sk-other"));
    }

    #[test]
    fn test_sanitize_leaves_clean_input() {
        assert_eq!(sanitize("upstream returned 503"), "upstream returned 503");
    }
}
