// SQLite-backed rate-limit and cache tables
// Author: kelexine (https://github.com/kelexine)

use super::{CacheStore, RateLimitStore};
use crate::cache::{CacheEntry, CacheTotals};
use crate::error::StoreError;
use crate::rate_limit::{RateLimitEntry, WindowHit};
use crate::utils::clock::deadline;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use tracing::{debug, warn};

/// Conditional statements can lose to a concurrent writer between steps;
/// the whole sequence is re-run at most this many times.
const MAX_HIT_ROUNDS: usize = 3;

/// Durable store shared by every process pointing at the same database file.
///
/// Rate-limit hits never read-then-write: every state change is a single
/// conditional statement, so two processes racing on one counter cannot both
/// be admitted past the ceiling.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if needed) the database file and run migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Backend(format!("Failed to create {}: {}", parent.display(), e)))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory database, useful for testing. A single connection keeps
    /// every query on the same database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    async fn run_migrations(pool: &Pool<Sqlite>) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rate_limits (
                identity_key TEXT PRIMARY KEY,
                count INTEGER NOT NULL,
                window_reset_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS response_cache (
                cache_key TEXT PRIMARY KEY,
                request_type TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                response_data TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                hit_count INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_response_cache_expires
            ON response_cache(expires_at)
            "#,
        )
        .execute(pool)
        .await?;

        debug!("SQLite migrations applied");
        Ok(())
    }

    fn rate_entry(key: &str, row: &SqliteRow) -> Result<RateLimitEntry, StoreError> {
        let count: i64 = row.try_get("count")?;
        let reset: i64 = row.try_get("window_reset_at")?;
        Ok(RateLimitEntry {
            identity_key: key.to_string(),
            count: u32::try_from(count).unwrap_or(u32::MAX),
            window_reset_at: from_millis(reset)?,
        })
    }

    fn cache_entry(row: &SqliteRow) -> Result<CacheEntry, StoreError> {
        let request_type: String = row.try_get("request_type")?;
        let response_data: String = row.try_get("response_data")?;
        let hit_count: i64 = row.try_get("hit_count")?;
        Ok(CacheEntry {
            cache_key: row.try_get("cache_key")?,
            request_type: request_type.parse().map_err(StoreError::Backend)?,
            content_hash: row.try_get("content_hash")?,
            response_data: serde_json::from_str(&response_data)?,
            created_at: from_millis(row.try_get("created_at")?)?,
            expires_at: from_millis(row.try_get("expires_at")?)?,
            hit_count: u64::try_from(hit_count).unwrap_or(0),
        })
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Backend(format!("timestamp out of range: {}", ms)))
}

#[async_trait]
impl RateLimitStore for SqliteStore {
    async fn hit(
        &self,
        key: &str,
        ceiling: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<WindowHit, StoreError> {
        let now_ms = now.timestamp_millis();
        let reset_ms = deadline(now, window).timestamp_millis();

        for round in 0..MAX_HIT_ROUNDS {
            // Active window with room left: count it.
            let incremented = sqlx::query(
                r#"
                UPDATE rate_limits SET count = count + 1
                WHERE identity_key = ?1 AND window_reset_at > ?2 AND count < ?3
                RETURNING count, window_reset_at
                "#,
            )
            .bind(key)
            .bind(now_ms)
            .bind(i64::from(ceiling))
            .fetch_optional(&self.pool)
            .await?;

            if let Some(row) = incremented {
                return Ok(WindowHit {
                    admitted: true,
                    entry: Self::rate_entry(key, &row)?,
                });
            }

            // Absent or closed window: start a new one.
            let started = sqlx::query(
                r#"
                INSERT INTO rate_limits (identity_key, count, window_reset_at)
                VALUES (?1, 1, ?2)
                ON CONFLICT(identity_key) DO UPDATE
                    SET count = 1, window_reset_at = excluded.window_reset_at
                    WHERE rate_limits.window_reset_at <= ?3
                RETURNING count, window_reset_at
                "#,
            )
            .bind(key)
            .bind(reset_ms)
            .bind(now_ms)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(row) = started {
                return Ok(WindowHit {
                    admitted: true,
                    entry: Self::rate_entry(key, &row)?,
                });
            }

            // Neither applied: the window is active and full, unless another
            // writer moved it between the two statements.
            let current = sqlx::query(
                "SELECT count, window_reset_at FROM rate_limits WHERE identity_key = ?1",
            )
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(row) = current {
                let entry = Self::rate_entry(key, &row)?;
                if entry.window_reset_at > now && entry.count >= ceiling {
                    return Ok(WindowHit {
                        admitted: false,
                        entry,
                    });
                }
            }
            debug!(key, round, "Rate-limit row changed concurrently, retrying");
        }

        warn!(key, "Rate-limit row kept changing under contention");
        Err(StoreError::Backend(format!(
            "rate-limit update for '{}' did not settle",
            key
        )))
    }

    async fn get(&self, key: &str) -> Result<Option<RateLimitEntry>, StoreError> {
        sqlx::query("SELECT count, window_reset_at FROM rate_limits WHERE identity_key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| Self::rate_entry(key, &row))
            .transpose()
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM rate_limits WHERE window_reset_at <= ?1")
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl CacheStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        sqlx::query(
            r#"
            SELECT cache_key, request_type, content_hash, response_data,
                   created_at, expires_at, hit_count
            FROM response_cache
            WHERE cache_key = ?1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?
        .map(|row| Self::cache_entry(&row))
        .transpose()
    }

    async fn upsert(&self, entry: CacheEntry) -> Result<(), StoreError> {
        let response_data = serde_json::to_string(&entry.response_data)?;
        sqlx::query(
            r#"
            INSERT INTO response_cache
                (cache_key, request_type, content_hash, response_data, created_at, expires_at, hit_count)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)
            ON CONFLICT(cache_key) DO UPDATE SET
                request_type = excluded.request_type,
                content_hash = excluded.content_hash,
                response_data = excluded.response_data,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(&entry.cache_key)
        .bind(entry.request_type.as_str())
        .bind(&entry.content_hash)
        .bind(response_data)
        .bind(entry.created_at.timestamp_millis())
        .bind(entry.expires_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_hit(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE response_cache SET hit_count = hit_count + 1 WHERE cache_key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM response_cache WHERE cache_key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM response_cache WHERE expires_at <= ?1")
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn totals(&self, now: DateTime<Utc>) -> Result<CacheTotals, StoreError> {
        let (entries, hits): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COALESCE(SUM(hit_count), 0)
            FROM response_cache
            WHERE expires_at > ?1
            "#,
        )
        .bind(now.timestamp_millis())
        .fetch_one(&self.pool)
        .await?;

        Ok(CacheTotals {
            entries: u64::try_from(entries).unwrap_or(0),
            total_hits: u64::try_from(hits).unwrap_or(0),
        })
    }
}
