// Content-addressed response cache for generation results
// Author: kelexine (https://github.com/kelexine)

use super::models::{CacheEntry, CacheStats, RequestType};
use crate::config::CacheConfig;
use crate::error::StoreError;
use crate::metrics;
use crate::store::CacheStore;
use crate::utils::clock::{deadline, span_secs, Clock};
use chrono::Duration;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Derive the lookup key for `content` submitted as `request_type`.
///
/// Content is trimmed and lowercased before hashing, so inputs differing only
/// in surrounding whitespace or case share a key. The request type is hashed
/// in as well as used as a readable namespace.
pub fn derive_cache_key(content: &str, request_type: RequestType, prefix_len: usize) -> String {
    let normalized = content.trim().to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hasher.update(request_type.as_str().as_bytes());
    let digest = hex::encode(hasher.finalize());
    let prefix = &digest[..prefix_len.min(digest.len())];
    format!("{}:{}", request_type, prefix)
}

/// Digest of the trimmed raw content, independent of request type.
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.trim().as_bytes()))
}

/// Read-through cache in front of the upstream generator.
///
/// Store failures never escape: a failed read is a miss and a failed write
/// is logged and dropped.
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>, config: CacheConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn cache_key(&self, content: &str, request_type: RequestType) -> String {
        derive_cache_key(content, request_type, self.config.key_prefix_len)
    }

    /// TTL for `request_type`: the configured override, else the default.
    pub fn ttl_for(&self, request_type: RequestType) -> Duration {
        let secs = self
            .config
            .ttl_overrides
            .get(request_type.as_str())
            .copied()
            .unwrap_or(self.config.default_ttl_secs);
        span_secs(secs)
    }

    /// Cached payload for `(content, request_type)` if a live entry exists.
    pub async fn get(&self, content: &str, request_type: RequestType) -> Option<Value> {
        if !self.config.enabled {
            return None;
        }

        let key = self.cache_key(content, request_type);
        let entry = match self.store.get(&key).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(cache_key = %key, error = %e, "Cache read failed, treating as miss");
                metrics::record_cache_operation("read_error");
                return None;
            }
        };

        let now = self.clock.now();
        match entry {
            Some(entry) if entry.is_live(now) => {
                debug!(cache_key = %key, hits = entry.hit_count + 1, "Cache hit");
                metrics::record_cache_operation("hit");

                // Hit counting is telemetry; the read never waits on it.
                let store = self.store.clone();
                tokio::spawn(async move {
                    if let Err(e) = store.record_hit(&key).await {
                        debug!(cache_key = %key, error = %e, "Failed to record cache hit");
                    }
                });

                Some(entry.response_data)
            }
            Some(_) => {
                debug!(cache_key = %key, "Cache entry expired");
                metrics::record_cache_operation("miss");
                None
            }
            None => {
                debug!(cache_key = %key, "Cache miss");
                metrics::record_cache_operation("miss");
                None
            }
        }
    }

    /// Store `payload` under `(content, request_type)`. Last write wins.
    pub async fn set(
        &self,
        content: &str,
        request_type: RequestType,
        payload: Value,
        ttl: Option<Duration>,
    ) {
        if !self.config.enabled {
            return;
        }

        let now = self.clock.now();
        let ttl = ttl.unwrap_or_else(|| self.ttl_for(request_type));
        let entry = CacheEntry {
            cache_key: self.cache_key(content, request_type),
            request_type,
            content_hash: content_hash(content),
            response_data: payload,
            created_at: now,
            expires_at: deadline(now, ttl),
            hit_count: 0,
        };
        let key = entry.cache_key.clone();

        match self.store.upsert(entry).await {
            Ok(()) => {
                debug!(cache_key = %key, ttl_secs = ttl.num_seconds(), "Cached response");
                metrics::record_cache_operation("store");
            }
            Err(e) => {
                warn!(cache_key = %key, error = %e, "Failed to cache response");
                metrics::record_cache_operation("store_error");
            }
        }
    }

    /// Drop the entry for `(content, request_type)`. Returns whether one existed.
    pub async fn invalidate(
        &self,
        content: &str,
        request_type: RequestType,
    ) -> Result<bool, StoreError> {
        let key = self.cache_key(content, request_type);
        let removed = self.store.remove(&key).await?;
        if removed {
            debug!(cache_key = %key, "Invalidated cache entry");
        }
        Ok(removed)
    }

    /// Delete every expired entry. Returns how many were removed.
    pub async fn clear_expired(&self) -> Result<u64, StoreError> {
        let removed = self.store.delete_expired(self.clock.now()).await?;
        metrics::record_cache_swept(removed);
        if removed > 0 {
            info!(removed, "Cleared expired cache entries");
        }
        Ok(removed)
    }

    /// Aggregate statistics over unexpired entries.
    pub async fn get_stats(&self) -> Result<CacheStats, StoreError> {
        let totals = self.store.totals(self.clock.now()).await?;
        Ok(CacheStats::from(totals))
    }
}
