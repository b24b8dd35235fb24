// Configuration module
// Author: kelexine (https://github.com/kelexine)

mod models;

pub use models::*;

use crate::error::{GuardError, Result};
use crate::utils::clock::MAX_SPAN_SECS;
use config::{Config, Environment, File};
use std::path::{Path, PathBuf};

impl AppConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Environment variables (highest)
    /// 2. Config file (`path`, or `~/.genguard/config.toml`)
    /// 3. Defaults (lowest)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (file, required) = match path {
            Some(p) => (p.to_string_lossy().to_string(), true),
            None => (Self::default_config_path(), false),
        };

        let config = Config::builder()
            // Start with defaults
            .add_source(Config::try_from(&Self::default())?)
            // Load from config file if it exists
            .add_source(File::with_name(&file).required(required))
            // Override with environment variables (GENGUARD_CACHE__DEFAULT_TTL_SECS=...)
            .add_source(
                Environment::with_prefix("GENGUARD")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(|e| GuardError::Config(e.to_string()))?;

        let loaded: Self = config
            .try_deserialize()
            .map_err(|e| GuardError::Config(e.to_string()))?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject settings that would make the guard misbehave silently.
    pub fn validate(&self) -> Result<()> {
        for (name, policy) in [
            ("user", &self.rate_limit.user),
            ("ip", &self.rate_limit.ip),
            ("scraping", &self.rate_limit.scraping),
            ("api", &self.rate_limit.api),
        ] {
            if policy.window_secs == 0 || policy.window_secs > MAX_SPAN_SECS {
                return Err(GuardError::Config(format!(
                    "rate_limit.{}.window_secs must be between 1 and {}",
                    name, MAX_SPAN_SECS
                )));
            }
        }
        if self.cache.default_ttl_secs > MAX_SPAN_SECS {
            return Err(GuardError::Config(format!(
                "cache.default_ttl_secs must not exceed {}",
                MAX_SPAN_SECS
            )));
        }
        if let Some((request_type, _)) = self
            .cache
            .ttl_overrides
            .iter()
            .find(|(_, secs)| **secs > MAX_SPAN_SECS)
        {
            return Err(GuardError::Config(format!(
                "cache.ttl_overrides.{} must not exceed {}",
                request_type, MAX_SPAN_SECS
            )));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(GuardError::Config(
                "retry.base_delay_ms must not exceed retry.max_delay_ms".to_string(),
            ));
        }
        if self.retry.attempt_timeout_ms == 0 {
            return Err(GuardError::Config(
                "retry.attempt_timeout_ms must be positive".to_string(),
            ));
        }
        if !(8..=64).contains(&self.cache.key_prefix_len) {
            return Err(GuardError::Config(
                "cache.key_prefix_len must be between 8 and 64".to_string(),
            ));
        }
        if self.cache.max_entries == 0 {
            return Err(GuardError::Config(
                "cache.max_entries must be positive".to_string(),
            ));
        }
        Ok(())
    }

    fn default_config_path() -> String {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".genguard")
            .join("config.toml")
            .to_string_lossy()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_documented_policy() {
        let config = AppConfig::default();
        assert_eq!(config.rate_limit.user, RateLimitPolicy::new(10, 60));
        assert_eq!(config.rate_limit.ip, RateLimitPolicy::new(20, 60));
        assert_eq!(config.rate_limit.scraping, RateLimitPolicy::new(3, 60));
        assert_eq!(config.rate_limit.api, RateLimitPolicy::new(60, 60));
        assert_eq!(config.cache.default_ttl_secs, 86_400);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.attempt_timeout_ms, 45_000);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[rate_limit.user]
max_requests = 4
window_secs = 30

[cache]
default_ttl_secs = 600

[cache.ttl_overrides]
lead_score = 3600

[store]
backend = "sqlite"
"#
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.rate_limit.user, RateLimitPolicy::new(4, 30));
        assert_eq!(config.rate_limit.ip, RateLimitPolicy::new(20, 60));
        assert_eq!(config.cache.default_ttl_secs, 600);
        assert_eq!(config.cache.ttl_overrides.get("lead_score"), Some(&3600));
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let mut config = AppConfig::default();
        config.rate_limit.ip.window_secs = 0;
        assert!(matches!(config.validate(), Err(GuardError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_unbounded_spans() {
        let mut config = AppConfig::default();
        config.cache.default_ttl_secs = 10_000_000_000_000;
        assert!(matches!(config.validate(), Err(GuardError::Config(_))));

        let mut config = AppConfig::default();
        config
            .cache
            .ttl_overrides
            .insert("audit".to_string(), MAX_SPAN_SECS + 1);
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.rate_limit.user.window_secs = u64::MAX;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.cache.default_ttl_secs = MAX_SPAN_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_rejects_huge_ttl_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[cache]\ndefault_ttl_secs = 10000000000000").unwrap();

        assert!(matches!(
            AppConfig::load(Some(file.path())),
            Err(GuardError::Config(_))
        ));
    }

    #[test]
    fn test_validate_rejects_inverted_delays() {
        let mut config = AppConfig::default();
        config.retry.base_delay_ms = 20_000;
        assert!(config.validate().is_err());
    }
}
