//! Process-local (L1) cache with per-entry TTL.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

/// One L1 entry.
#[derive(Debug, Clone)]
struct MemoryEntry {
    value: serde_json::Value,
    tags: Vec<String>,
    expires_at: DateTime<Utc>,
}

/// L1 cache statistics.
#[derive(Debug, Clone)]
pub struct MemoryCacheStats {
    /// Total number of entries, including expired ones not yet swept.
    pub total_count: usize,
    /// Number of expired entries still held.
    pub expired_count: usize,
}

/// In-memory TTL cache. Explicitly allowed to be stale relative to L2 up
/// to the promotion TTL; never authoritative across instances.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, MemoryEntry>>,
}

impl MemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a live entry by key.
    pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
        let entries = self.entries.read().await;
        entries.get(key).and_then(|entry| {
            if Utc::now() < entry.expires_at {
                Some(entry.value.clone())
            } else {
                None
            }
        })
    }

    /// Insert an entry with its tags and TTL.
    pub async fn insert(
        &self,
        key: &str,
        value: serde_json::Value,
        tags: &[String],
        ttl_secs: i64,
    ) {
        let entry = MemoryEntry {
            value,
            tags: tags.to_vec(),
            expires_at: Utc::now() + Duration::seconds(ttl_secs),
        };
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), entry);
    }

    /// Remove a single entry.
    pub async fn remove(&self, key: &str) {
        let mut entries = self.entries.write().await;
        entries.remove(key);
    }

    /// Remove every entry sharing any of `tags`.
    pub async fn remove_by_tags(&self, tags: &[String]) {
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| !entry.tags.iter().any(|t| tags.contains(t)));
    }

    /// Remove a batch of keys (mirror of an L2 tag invalidation).
    pub async fn remove_keys(&self, keys: &[String]) {
        let mut entries = self.entries.write().await;
        for key in keys {
            entries.remove(key);
        }
    }

    /// Drop expired entries.
    pub async fn clear_expired(&self) {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.expires_at > now);
    }

    /// Statistics for health reporting.
    pub async fn stats(&self) -> MemoryCacheStats {
        let now = Utc::now();
        let entries = self.entries.read().await;
        MemoryCacheStats {
            total_count: entries.len(),
            expired_count: entries.values().filter(|e| e.expires_at <= now).count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tags(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| (*s).to_string()).collect()
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let cache = MemoryCache::new();
        cache.insert("k1", json!({"a": 1}), &[], 60).await;

        assert_eq!(cache.get("k1").await, Some(json!({"a": 1})));
        assert_eq!(cache.get("missing").await, None);
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let cache = MemoryCache::new();
        cache.insert("k1", json!(1), &[], 0).await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert_eq!(cache.get("k1").await, None);

        let stats = cache.stats().await;
        assert_eq!(stats.total_count, 1);
        assert_eq!(stats.expired_count, 1);
    }

    #[tokio::test]
    async fn test_remove_by_tags() {
        let cache = MemoryCache::new();
        cache
            .insert("q1", json!(1), &tags(&["tenant:a", "questions"]), 60)
            .await;
        cache.insert("q2", json!(2), &tags(&["tenant:b"]), 60).await;

        cache.remove_by_tags(&tags(&["tenant:a"])).await;

        assert_eq!(cache.get("q1").await, None);
        assert_eq!(cache.get("q2").await, Some(json!(2)));
    }

    #[tokio::test]
    async fn test_remove_keys() {
        let cache = MemoryCache::new();
        cache.insert("a", json!(1), &[], 60).await;
        cache.insert("b", json!(2), &[], 60).await;

        cache.remove_keys(&tags(&["a", "c"])).await;

        assert_eq!(cache.get("a").await, None);
        assert_eq!(cache.get("b").await, Some(json!(2)));
    }

    #[tokio::test]
    async fn test_clear_expired() {
        let cache = MemoryCache::new();
        cache.insert("dead", json!(1), &[], 0).await;
        cache.insert("live", json!(2), &[], 60).await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        cache.clear_expired().await;

        let stats = cache.stats().await;
        assert_eq!(stats.total_count, 1);
        assert_eq!(stats.expired_count, 0);
    }
}
