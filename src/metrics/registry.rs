// Prometheus metrics registry and collectors
// Author: kelexine (https://github.com/kelexine)

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec_with_registry, register_histogram_vec_with_registry,
    register_int_counter_with_registry, CounterVec, Encoder, HistogramVec, IntCounter, Opts,
    Registry, TextEncoder,
};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // GOVERNED REQUEST METRICS
    // ============================================================================

    /// Governed generation requests by final outcome
    pub static ref GOVERNED_REQUESTS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("governed_requests_total", "Total governed generation requests"),
        &["request_type", "outcome"], // outcome: generated, cached, rate_limited, plan_limited, failed
        REGISTRY
    ).unwrap();

    // ============================================================================
    // RATE LIMIT METRICS
    // ============================================================================

    pub static ref RATE_LIMIT_DECISIONS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("rate_limit_decisions_total", "Rate limit decisions"),
        &["dimension", "decision"], // decision: allowed, denied, fail_open, fail_closed
        REGISTRY
    ).unwrap();

    // ============================================================================
    // CACHE METRICS
    // ============================================================================

    pub static ref CACHE_OPERATIONS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("response_cache_operations_total", "Response cache operations"),
        &["operation"], // operation: hit, miss, store, store_error, read_error
        REGISTRY
    ).unwrap();

    pub static ref CACHE_ENTRIES_SWEPT: IntCounter = register_int_counter_with_registry!(
        Opts::new("cache_entries_swept_total", "Expired cache entries removed by sweeps"),
        REGISTRY
    ).unwrap();

    // ============================================================================
    // UPSTREAM METRICS
    // ============================================================================

    pub static ref UPSTREAM_ATTEMPTS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("upstream_attempts_total", "Upstream generation attempts"),
        &["outcome"], // outcome: success, retryable, terminal, timeout
        REGISTRY
    ).unwrap();

    /// Duration of a whole guarded upstream call, retries included
    pub static ref UPSTREAM_DURATION: HistogramVec = register_histogram_vec_with_registry!(
        prometheus::HistogramOpts::new("upstream_duration_seconds", "Guarded upstream call duration")
            .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        &["request_type"],
        REGISTRY
    ).unwrap();
}

/// Gather all metrics and return as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
