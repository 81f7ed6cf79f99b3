//! L1-over-L2 cache orchestration with a pluggable hot-key strategy.

use std::sync::Arc;

use sqlx::PgPool;

use crate::memory::MemoryCache;
use crate::store::CacheStore;
use crate::CacheError;

/// Default TTL for entries promoted into L1 on an L2 hit, in seconds.
pub const DEFAULT_PROMOTION_TTL_SECS: i64 = 30;

/// Strategy deciding which keys are worth holding in process memory.
///
/// Kept behind a trait so the heuristic is swappable and testable in
/// isolation from the cache itself.
pub trait HotKeyPolicy: Send + Sync {
    /// True when `key` should be promoted into (and written through to) L1.
    fn is_hot(&self, key: &str) -> bool;
}

/// Hot-key policy matching a fixed set of key prefixes.
#[derive(Debug, Clone)]
pub struct PrefixHotKeys {
    prefixes: Vec<String>,
}

impl PrefixHotKeys {
    /// Create a policy from the given prefixes.
    #[must_use]
    pub fn new(prefixes: Vec<String>) -> Self {
        Self { prefixes }
    }

    /// The default production policy: credentials and seller profiles are
    /// read on nearly every gateway call.
    #[must_use]
    pub fn default_hot_classes() -> Self {
        Self::new(vec![
            "credential:".to_string(),
            "seller:".to_string(),
            "token-exchange:".to_string(),
        ])
    }
}

impl HotKeyPolicy for PrefixHotKeys {
    fn is_hot(&self, key: &str) -> bool {
        self.prefixes.iter().any(|p| key.starts_with(p.as_str()))
    }
}

/// The two-layer cache.
///
/// `get` consults L1 first, then L2, promoting hot L2 hits into L1 with
/// the short promotion TTL. `set` always writes L2 and conditionally L1.
/// Tag invalidation clears both layers; the L2 delete returns the removed
/// keys so L1 eviction is exact rather than tag-pattern based.
#[derive(Clone)]
pub struct LayeredCache {
    l1: Arc<MemoryCache>,
    l2: CacheStore,
    hot_keys: Arc<dyn HotKeyPolicy>,
    promotion_ttl_secs: i64,
}

impl LayeredCache {
    /// Create a layered cache over the shared pool.
    #[must_use]
    pub fn new(pool: PgPool, hot_keys: Arc<dyn HotKeyPolicy>) -> Self {
        Self {
            l1: Arc::new(MemoryCache::new()),
            l2: CacheStore::new(pool),
            hot_keys,
            promotion_ttl_secs: DEFAULT_PROMOTION_TTL_SECS,
        }
    }

    /// Override the promotion TTL.
    #[must_use]
    pub fn with_promotion_ttl(mut self, ttl_secs: i64) -> Self {
        self.promotion_ttl_secs = ttl_secs;
        self
    }

    /// Look up a key, L1 first.
    pub async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError> {
        if let Some(value) = self.l1.get(key).await {
            tracing::trace!(target: "cache", key, layer = "l1", "Cache hit");
            return Ok(Some(value));
        }

        let Some(value) = self.l2.get(key).await? else {
            tracing::trace!(target: "cache", key, "Cache miss");
            return Ok(None);
        };

        tracing::trace!(target: "cache", key, layer = "l2", "Cache hit");

        if self.hot_keys.is_hot(key) {
            // Promotion carries no tags: the entry can only be evicted from
            // L1 by key (via the L2 tag delete's returned keys) or by TTL.
            self.l1
                .insert(key, value.clone(), &[], self.promotion_ttl_secs)
                .await;
        }

        Ok(Some(value))
    }

    /// Write a value to L2 (always) and L1 (hot keys only).
    pub async fn set(
        &self,
        key: &str,
        value: &serde_json::Value,
        tags: &[String],
        ttl_secs: i64,
    ) -> Result<(), CacheError> {
        self.l2.set(key, value, tags, ttl_secs).await?;

        if self.hot_keys.is_hot(key) {
            let l1_ttl = ttl_secs.min(self.promotion_ttl_secs);
            self.l1.insert(key, value.clone(), tags, l1_ttl).await;
        }

        Ok(())
    }

    /// Remove one key from both layers.
    pub async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.l2.remove(key).await?;
        self.l1.remove(key).await;
        Ok(())
    }

    /// Remove every key associated with any of `tags` from both layers.
    pub async fn invalidate_by_tags(&self, tags: &[String]) -> Result<u64, CacheError> {
        let removed = self.l2.remove_by_tags(tags).await?;
        // Evict by returned key AND by tag: L1 may hold tagged entries whose
        // L2 row already expired and so was not returned.
        self.l1.remove_keys(&removed).await;
        self.l1.remove_by_tags(tags).await;
        Ok(removed.len() as u64)
    }

    /// Sweep expired entries in both layers (janitor hook).
    pub async fn cleanup_expired(&self) -> Result<u64, CacheError> {
        self.l1.clear_expired().await;
        self.l2.cleanup_expired().await
    }

    /// Access the L2 store (warm-up writes bypass hot-key promotion).
    #[must_use]
    pub fn store(&self) -> &CacheStore {
        &self.l2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_policy_matches_prefixes() {
        let policy = PrefixHotKeys::new(vec!["credential:".to_string()]);
        assert!(policy.is_hot("credential:tenant-1"));
        assert!(!policy.is_hot("question:Q123"));
    }

    #[test]
    fn test_default_hot_classes() {
        let policy = PrefixHotKeys::default_hot_classes();
        assert!(policy.is_hot("credential:abc"));
        assert!(policy.is_hot("seller:123"));
        assert!(policy.is_hot("token-exchange:code-xyz"));
        assert!(!policy.is_hot("item:MLB123"));
    }

    #[test]
    fn test_custom_policy_via_trait_object() {
        struct Never;
        impl HotKeyPolicy for Never {
            fn is_hot(&self, _key: &str) -> bool {
                false
            }
        }
        let policy: Arc<dyn HotKeyPolicy> = Arc::new(Never);
        assert!(!policy.is_hot("credential:abc"));
    }
}
