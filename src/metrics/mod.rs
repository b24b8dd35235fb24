// Metrics module for Prometheus observability
// Author: kelexine (https://github.com/kelexine)

mod registry;

pub use registry::{
    gather_metrics, CACHE_ENTRIES_SWEPT, CACHE_OPERATIONS, GOVERNED_REQUESTS,
    RATE_LIMIT_DECISIONS, UPSTREAM_ATTEMPTS, UPSTREAM_DURATION,
};

/// Helper to record the final outcome of a governed request
pub fn record_governed_request(request_type: &str, outcome: &str) {
    GOVERNED_REQUESTS
        .with_label_values(&[request_type, outcome])
        .inc();
}

/// Helper to record a rate limiter decision
pub fn record_rate_decision(dimension: &str, decision: &str) {
    RATE_LIMIT_DECISIONS
        .with_label_values(&[dimension, decision])
        .inc();
}

/// Helper to record response cache operations
pub fn record_cache_operation(operation: &str) {
    CACHE_OPERATIONS.with_label_values(&[operation]).inc();
}

pub fn record_cache_swept(count: u64) {
    CACHE_ENTRIES_SWEPT.inc_by(count);
}

/// Helper to record the outcome of one upstream attempt
pub fn record_retry_attempt(outcome: &str) {
    UPSTREAM_ATTEMPTS.with_label_values(&[outcome]).inc();
}

pub fn record_upstream_duration(request_type: &str, duration_secs: f64) {
    UPSTREAM_DURATION
        .with_label_values(&[request_type])
        .observe(duration_secs);
}
