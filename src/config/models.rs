//! Configuration data structures for the generation guard.
//!
//! This module defines the schema for the application settings: server
//! parameters, rate-limit ceilings, cache TTLs, retry policy, the upstream
//! provider and the backing store.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The root configuration object for the application.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// HTTP server settings (host, port, workers).
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging and observability settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Per-identity request ceilings.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Response cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Retry policy for upstream calls.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Upstream AI provider settings.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Backing store for rate counters and cache entries.
    #[serde(default)]
    pub store: StoreConfig,

    /// Subscription tiers and their monthly generation ceilings.
    #[serde(default)]
    pub plans: PlansConfig,
}

/// Settings for the built-in HTTP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The IP address or hostname the server should bind to.
    /// Default: `127.0.0.1`
    #[serde(default = "default_host")]
    pub host: String,

    /// The port number the server should listen on.
    /// Default: `8080`
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of runtime worker threads.
    /// Default: Number of logical CPU cores.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Take the client IP from the first `X-Forwarded-For` hop when present.
    /// Default: `true`
    #[serde(default = "default_true")]
    pub trust_forwarded_for: bool,
}

/// Settings for application logging and output format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum log level (`trace`, `debug`, `info`, `warn`, `error`).
    /// Default: `info`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format for logs (`pretty`, `json`, `compact`).
    /// Default: `pretty`
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Whether to mask user ids and IP addresses in logs.
    /// Default: `true`
    #[serde(default = "default_true")]
    pub redact_identities: bool,
}

/// A fixed-window ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl RateLimitPolicy {
    pub const fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs,
        }
    }
}

/// Ceilings per identity dimension and operation category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Generation requests per authenticated user.
    /// Default: 10 per 60s
    #[serde(default = "default_user_policy")]
    pub user: RateLimitPolicy,

    /// Generation requests per client IP.
    /// Default: 20 per 60s
    #[serde(default = "default_ip_policy")]
    pub ip: RateLimitPolicy,

    /// Scraping-class operations, both dimensions.
    /// Default: 3 per 60s
    #[serde(default = "default_scraping_policy")]
    pub scraping: RateLimitPolicy,

    /// General API traffic, both dimensions.
    /// Default: 60 per 60s
    #[serde(default = "default_api_policy")]
    pub api: RateLimitPolicy,

    /// Admit requests when the rate-limit store is unreachable.
    /// Default: `true`
    #[serde(default = "default_true")]
    pub fail_open: bool,
}

/// Settings for the response cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether caching is enabled.
    /// Default: `true`
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// TTL applied when neither the caller nor an override names one.
    /// Default: `86400` (24 hours)
    #[serde(default = "default_cache_ttl")]
    pub default_ttl_secs: u64,

    /// Per request type TTLs, keyed by the request type tag.
    #[serde(default)]
    pub ttl_overrides: HashMap<String, u64>,

    /// Hex characters of the digest kept in the cache key.
    /// Default: `32`
    #[serde(default = "default_key_prefix_len")]
    pub key_prefix_len: usize,

    /// Entry bound for the in-memory backend.
    /// Default: `10000`
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

/// Settings for retrying upstream calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    /// Default: `3`
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Budget for each individual attempt.
    /// Default: `45000`
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_ms: u64,

    /// Default: `1000`
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Default: `10000`
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Upper bound (exclusive) of the random jitter added to each delay.
    /// Default: `1000`
    #[serde(default = "default_max_jitter")]
    pub max_jitter_ms: u64,
}

/// Settings for the upstream AI provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of an OpenAI-compatible API.
    /// Default: `https://api.openai.com/v1`
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Default: `gpt-4o-mini`
    #[serde(default = "default_model")]
    pub model: String,

    /// Bearer token; normally supplied through `GENGUARD_UPSTREAM__API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Default: `10`
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Default: `2048`
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Default: `0.7`
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

/// Which store backs rate counters and cache entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Single process only.
    Memory,
    /// Shared SQLite database file.
    Sqlite,
}

/// Settings for the backing store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Default: `memory`
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,

    /// Database file for the `sqlite` backend.
    /// Default: `~/.genguard/genguard.db`
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,

    /// Interval of the expired-entry sweep.
    /// Default: `3600`
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

/// Subscription tiers for the built-in usage ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlansConfig {
    /// Tier of users without an assignment.
    /// Default: `free`
    #[serde(default = "default_tier")]
    pub default_tier: String,

    /// Monthly generation ceiling per tier.
    #[serde(default = "default_tiers")]
    pub tiers: HashMap<String, u64>,

    /// Tiers without a ceiling.
    #[serde(default = "default_unlimited_tiers")]
    pub unlimited_tiers: Vec<String>,

    /// User id to tier.
    #[serde(default)]
    pub assignments: HashMap<String, String>,
}

// Default trait implementations linking to custom logic

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: default_workers(),
            trust_forwarded_for: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            redact_identities: true,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            user: default_user_policy(),
            ip: default_ip_policy(),
            scraping: default_scraping_policy(),
            api: default_api_policy(),
            fail_open: true,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_secs: default_cache_ttl(),
            ttl_overrides: HashMap::new(),
            key_prefix_len: default_key_prefix_len(),
            max_entries: default_max_entries(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            attempt_timeout_ms: default_attempt_timeout(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            max_jitter_ms: default_max_jitter(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            model: default_model(),
            api_key: None,
            connect_timeout_secs: default_connect_timeout(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            sqlite_path: default_sqlite_path(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl Default for PlansConfig {
    fn default() -> Self {
        Self {
            default_tier: default_tier(),
            tiers: default_tiers(),
            unlimited_tiers: default_unlimited_tiers(),
            assignments: HashMap::new(),
        }
    }
}

// Helper functions for serde defaults and shared constants
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_user_policy() -> RateLimitPolicy {
    RateLimitPolicy::new(10, 60)
}

fn default_ip_policy() -> RateLimitPolicy {
    RateLimitPolicy::new(20, 60)
}

fn default_scraping_policy() -> RateLimitPolicy {
    RateLimitPolicy::new(3, 60)
}

fn default_api_policy() -> RateLimitPolicy {
    RateLimitPolicy::new(60, 60)
}

fn default_cache_ttl() -> u64 {
    86_400 // 24 hours
}

fn default_key_prefix_len() -> usize {
    32
}

fn default_max_entries() -> usize {
    10_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_attempt_timeout() -> u64 {
    45_000
}

fn default_base_delay() -> u64 {
    1_000
}

fn default_max_delay() -> u64 {
    10_000
}

fn default_max_jitter() -> u64 {
    1_000
}

fn default_api_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_temperature() -> f32 {
    0.7
}

fn default_backend() -> StoreBackend {
    StoreBackend::Memory
}

fn default_sqlite_path() -> String {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".genguard")
        .join("genguard.db")
        .to_string_lossy()
        .to_string()
}

fn default_sweep_interval() -> u64 {
    3600
}

fn default_tier() -> String {
    "free".to_string()
}

fn default_tiers() -> HashMap<String, u64> {
    HashMap::from([
        ("free".to_string(), 5),
        ("starter".to_string(), 50),
        ("professional".to_string(), 200),
    ])
}

fn default_unlimited_tiers() -> Vec<String> {
    vec!["agency".to_string()]
}
