//! Shared (L2) cache store over the `cache_entries` table.

use chrono::{Duration, Utc};
use sqlx::PgPool;

use crate::CacheError;
use vendra_db::models::CacheRow;

/// Thin service over the L2 table; owns expiry computation so callers
/// speak in TTLs, not timestamps.
#[derive(Debug, Clone)]
pub struct CacheStore {
    pool: PgPool,
}

impl CacheStore {
    /// Create a store over the shared pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch a live value.
    pub async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError> {
        let row = CacheRow::get_live(&self.pool, key).await?;
        Ok(row.map(|r| r.value))
    }

    /// Write a value with its tags and TTL.
    pub async fn set(
        &self,
        key: &str,
        value: &serde_json::Value,
        tags: &[String],
        ttl_secs: i64,
    ) -> Result<(), CacheError> {
        let expires_at = Utc::now() + Duration::seconds(ttl_secs);
        CacheRow::upsert(&self.pool, key, value, tags, expires_at).await?;
        Ok(())
    }

    /// Delete one entry.
    pub async fn remove(&self, key: &str) -> Result<(), CacheError> {
        CacheRow::delete(&self.pool, key).await?;
        Ok(())
    }

    /// Delete all entries sharing any of `tags`; returns the removed keys.
    pub async fn remove_by_tags(&self, tags: &[String]) -> Result<Vec<String>, CacheError> {
        Ok(CacheRow::delete_by_tags(&self.pool, tags).await?)
    }

    /// Sweep expired entries (janitor hook).
    pub async fn cleanup_expired(&self) -> Result<u64, CacheError> {
        Ok(CacheRow::cleanup_expired(&self.pool).await?)
    }
}
