// In-process store backends
// Author: kelexine (https://github.com/kelexine)

use super::{CacheStore, RateLimitStore};
use crate::cache::{CacheEntry, CacheTotals};
use crate::error::StoreError;
use crate::rate_limit::{RateLimitEntry, WindowHit};
use crate::utils::clock::deadline;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use tracing::debug;

/// Rate counters in a mutex-guarded map. The whole increment-or-reset runs
/// under one lock, so concurrent hits on a key never lose updates.
#[derive(Debug, Default)]
pub struct MemoryRateLimitStore {
    entries: Mutex<HashMap<String, RateLimitEntry>>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn hit(
        &self,
        key: &str,
        ceiling: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<WindowHit, StoreError> {
        let mut entries = self.entries.lock();

        match entries.get_mut(key) {
            Some(entry) if now < entry.window_reset_at => {
                let admitted = entry.count < ceiling;
                if admitted {
                    entry.count += 1;
                }
                Ok(WindowHit {
                    admitted,
                    entry: entry.clone(),
                })
            }
            _ => {
                let entry = RateLimitEntry {
                    identity_key: key.to_string(),
                    count: 1,
                    window_reset_at: deadline(now, window),
                };
                entries.insert(key.to_string(), entry.clone());
                Ok(WindowHit {
                    admitted: true,
                    entry,
                })
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<RateLimitEntry>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| now < e.window_reset_at);
        Ok((before - entries.len()) as u64)
    }
}

/// Cache entries in a bounded LRU. Past `max_entries` the least recently
/// used entry is evicted, expired or not.
pub struct MemoryCacheStore {
    entries: Mutex<LruCache<String, CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new(max_entries: usize) -> Self {
        let cap = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(cap)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn upsert(&self, entry: CacheEntry) -> Result<(), StoreError> {
        let mut entries = self.entries.lock();
        let hit_count = entries
            .peek(&entry.cache_key)
            .map(|existing| existing.hit_count)
            .unwrap_or(0);
        let key = entry.cache_key.clone();
        // push hands back the replaced pair on update, the LRU victim on overflow
        if let Some((evicted, _)) = entries.push(key.clone(), CacheEntry { hit_count, ..entry }) {
            if evicted != key {
                debug!(cache_key = %evicted, "Evicted cache entry");
            }
        }
        Ok(())
    }

    async fn record_hit(&self, key: &str) -> Result<(), StoreError> {
        if let Some(entry) = self.entries.lock().peek_mut(key) {
            entry.hit_count += 1;
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.entries.lock().pop(key).is_some())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut entries = self.entries.lock();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, e)| !e.is_live(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        Ok(expired.len() as u64)
    }

    async fn totals(&self, now: DateTime<Utc>) -> Result<CacheTotals, StoreError> {
        let entries = self.entries.lock();
        Ok(entries
            .iter()
            .filter(|(_, e)| e.is_live(now))
            .fold(CacheTotals::default(), |acc, (_, e)| CacheTotals {
                entries: acc.entries + 1,
                total_hits: acc.total_hits + e.hit_count,
            }))
    }
}
