//! Distributed (L2) cache entries with tagged invalidation.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// One L2 cache entry.
#[derive(Debug, Clone, FromRow)]
pub struct CacheRow {
    pub key: String,
    pub value: serde_json::Value,
    pub tags: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CacheRow {
    /// Upsert an entry with its tags and expiry.
    pub async fn upsert(
        pool: &sqlx::PgPool,
        key: &str,
        value: &serde_json::Value,
        tags: &[String],
        expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            INSERT INTO cache_entries (key, value, tags, expires_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (key)
            DO UPDATE SET
                value = EXCLUDED.value,
                tags = EXCLUDED.tags,
                expires_at = EXCLUDED.expires_at,
                updated_at = NOW()
            ",
        )
        .bind(key)
        .bind(value)
        .bind(tags)
        .bind(expires_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Fetch a live entry; expired rows are treated as absent.
    pub async fn get_live(pool: &sqlx::PgPool, key: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM cache_entries
            WHERE key = $1 AND expires_at > NOW()
            ",
        )
        .bind(key)
        .fetch_optional(pool)
        .await
    }

    /// Delete one entry.
    pub async fn delete(pool: &sqlx::PgPool, key: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE key = $1")
            .bind(key)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every entry sharing any of `tags`, returning the removed keys
    /// so the caller can evict them from L1 as well.
    pub async fn delete_by_tags(
        pool: &sqlx::PgPool,
        tags: &[String],
    ) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> =
            sqlx::query_as("DELETE FROM cache_entries WHERE tags && $1 RETURNING key")
                .bind(tags)
                .fetch_all(pool)
                .await?;
        Ok(rows.into_iter().map(|(key,)| key).collect())
    }

    /// Sweep expired entries.
    pub async fn cleanup_expired(pool: &sqlx::PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE expires_at < NOW()")
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
