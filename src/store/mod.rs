//! Persistence for rate-limit counters and cached responses.
//!
//! Both stores are shared, multi-writer resources. Callers must treat every
//! read as possibly stale by the time a later write is issued, which is why
//! the rate-limit side exposes a single atomic [`RateLimitStore::hit`]
//! instead of separate read and write calls.
//!
//! ## Backends
//!
//! - **memory** - [`MemoryRateLimitStore`] / [`MemoryCacheStore`], one process only
//! - **sqlite** - [`SqliteStore`], implements both traits over one database
//!
//! Author: kelexine (<https://github.com/kelexine>)

mod memory;
mod sqlite;

pub use memory::{MemoryCacheStore, MemoryRateLimitStore};
pub use sqlite::SqliteStore;

use crate::cache::{CacheEntry, CacheTotals};
use crate::config::{StoreBackend, StoreConfig};
use crate::error::StoreError;
use crate::rate_limit::{RateLimitEntry, WindowHit};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::info;

/// Fixed-window counters keyed by identity.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Atomically count one request against `key`.
    ///
    /// If the entry is absent or its window has closed (`now >= window_reset_at`),
    /// it becomes `count = 1, window_reset_at = now + window` and the request is
    /// admitted. Otherwise, if `count < ceiling` the count is incremented and the
    /// request admitted; if not, nothing changes and the request is refused.
    async fn hit(
        &self,
        key: &str,
        ceiling: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<WindowHit, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<RateLimitEntry>, StoreError>;

    /// Delete entries whose window has closed. Returns how many were removed.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Cached responses keyed by content-addressed cache key.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Raw lookup. Expiry filtering is the caller's job.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError>;

    /// Insert or replace by `cache_key`. An existing row keeps its `hit_count`.
    async fn upsert(&self, entry: CacheEntry) -> Result<(), StoreError>;

    async fn record_hit(&self, key: &str) -> Result<(), StoreError>;

    async fn remove(&self, key: &str) -> Result<bool, StoreError>;

    /// Delete every row with `expires_at <= now`.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Entry and hit totals over rows with `expires_at > now`.
    async fn totals(&self, now: DateTime<Utc>) -> Result<CacheTotals, StoreError>;
}

/// Both stores, selected by deployment context.
#[derive(Clone)]
pub struct Stores {
    pub rate_limits: Arc<dyn RateLimitStore>,
    pub cache: Arc<dyn CacheStore>,
}

impl Stores {
    pub fn in_memory(max_cache_entries: usize) -> Self {
        Self {
            rate_limits: Arc::new(MemoryRateLimitStore::new()),
            cache: Arc::new(MemoryCacheStore::new(max_cache_entries)),
        }
    }

    /// Open the configured backend.
    pub async fn open(config: &StoreConfig, max_cache_entries: usize) -> Result<Self, StoreError> {
        match config.backend {
            StoreBackend::Memory => {
                info!("Using in-memory store (single process)");
                Ok(Self::in_memory(max_cache_entries))
            }
            StoreBackend::Sqlite => {
                info!(path = %config.sqlite_path, "Using SQLite store");
                let store = Arc::new(SqliteStore::open(&config.sqlite_path).await?);
                Ok(Self {
                    rate_limits: store.clone(),
                    cache: store,
                })
            }
        }
    }
}
