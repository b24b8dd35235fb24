// Shared fixtures for integration tests
// Author: kelexine (https://github.com/kelexine)

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use genguard::cache::{CacheEntry, CacheTotals};
use genguard::error::StoreError;
use genguard::rate_limit::{RateLimitEntry, WindowHit};
use genguard::store::{CacheStore, RateLimitStore};
use genguard::upstream::{ContentGenerator, GenerationPrompt, UpstreamError};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A store whose backend is always down.
#[derive(Debug, Default)]
pub struct UnreachableStore;

fn down() -> StoreError {
    StoreError::Backend("connection refused".to_string())
}

#[async_trait]
impl RateLimitStore for UnreachableStore {
    async fn hit(
        &self,
        _key: &str,
        _ceiling: u32,
        _window: Duration,
        _now: DateTime<Utc>,
    ) -> Result<WindowHit, StoreError> {
        Err(down())
    }

    async fn get(&self, _key: &str) -> Result<Option<RateLimitEntry>, StoreError> {
        Err(down())
    }

    async fn sweep_expired(&self, _now: DateTime<Utc>) -> Result<u64, StoreError> {
        Err(down())
    }
}

#[async_trait]
impl CacheStore for UnreachableStore {
    async fn get(&self, _key: &str) -> Result<Option<CacheEntry>, StoreError> {
        Err(down())
    }

    async fn upsert(&self, _entry: CacheEntry) -> Result<(), StoreError> {
        Err(down())
    }

    async fn record_hit(&self, _key: &str) -> Result<(), StoreError> {
        Err(down())
    }

    async fn remove(&self, _key: &str) -> Result<bool, StoreError> {
        Err(down())
    }

    async fn delete_expired(&self, _now: DateTime<Utc>) -> Result<u64, StoreError> {
        Err(down())
    }

    async fn totals(&self, _now: DateTime<Utc>) -> Result<CacheTotals, StoreError> {
        Err(down())
    }
}

/// Generator that replays scripted outcomes, then succeeds with a fixed payload.
#[derive(Default)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<Value, UpstreamError>>>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<Result<Value, UpstreamError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn default_payload() -> Value {
    json!({"title": "Sunny downtown loft", "body": "Generated listing copy"})
}

#[async_trait]
impl ContentGenerator for ScriptedGenerator {
    async fn generate(&self, _prompt: &GenerationPrompt) -> Result<Value, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| Ok(default_payload()))
    }
}
