//! Background warm-up of high-value cache keys.
//!
//! Keeps the gateway's hit rate up by refreshing a fixed set of keys
//! (active credentials, recently active seller profiles) on an interval
//! shorter than their TTL, so they are re-read from the source before
//! they would otherwise expire.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::layered::LayeredCache;
use crate::CacheError;

/// One entry produced by a warm-up loader.
#[derive(Debug, Clone)]
pub struct WarmEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub tags: Vec<String>,
    pub ttl_secs: i64,
}

/// Source of warm-up entries for one key class.
#[async_trait]
pub trait WarmupLoader: Send + Sync {
    /// Loader name for log lines.
    fn name(&self) -> &'static str;

    /// Produce the current set of entries to refresh.
    async fn load(&self) -> Result<Vec<WarmEntry>, CacheError>;
}

/// Interval task refreshing all registered loaders.
pub struct CacheWarmer {
    cache: LayeredCache,
    loaders: Vec<Arc<dyn WarmupLoader>>,
    interval: Duration,
}

impl CacheWarmer {
    /// Create a warmer over the given cache.
    #[must_use]
    pub fn new(cache: LayeredCache, interval: Duration) -> Self {
        Self {
            cache,
            loaders: Vec::new(),
            interval,
        }
    }

    /// Register a loader.
    #[must_use]
    pub fn with_loader(mut self, loader: Arc<dyn WarmupLoader>) -> Self {
        self.loaders.push(loader);
        self
    }

    /// Run one warm-up pass across all loaders.
    ///
    /// Loader failures are logged and skipped; one degraded source must not
    /// stop the others from refreshing.
    pub async fn run_once(&self) {
        for loader in &self.loaders {
            match loader.load().await {
                Ok(entries) => {
                    let count = entries.len();
                    for entry in entries {
                        if let Err(e) = self
                            .cache
                            .set(&entry.key, &entry.value, &entry.tags, entry.ttl_secs)
                            .await
                        {
                            tracing::warn!(
                                target: "cache",
                                loader = loader.name(),
                                key = %entry.key,
                                error = %e,
                                "Warm-up write failed"
                            );
                        }
                    }
                    tracing::debug!(
                        target: "cache",
                        loader = loader.name(),
                        entries = count,
                        "Warm-up pass refreshed entries"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        target: "cache",
                        loader = loader.name(),
                        error = %e,
                        "Warm-up loader failed"
                    );
                }
            }
        }
    }

    /// Spawn the periodic warm-up task. Aborts when the handle is dropped
    /// by the caller's shutdown path.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                self.run_once().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLoader {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl WarmupLoader for CountingLoader {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn load(&self) -> Result<Vec<WarmEntry>, CacheError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![WarmEntry {
                key: "credential:warm".to_string(),
                value: json!({"warmed": true}),
                tags: vec!["credentials".to_string()],
                ttl_secs: 300,
            }])
        }
    }

    #[test]
    fn test_warm_entry_shape() {
        let entry = WarmEntry {
            key: "seller:1".to_string(),
            value: json!({"nickname": "ACME"}),
            tags: vec!["seller:1".to_string()],
            ttl_secs: 600,
        };
        assert_eq!(entry.key, "seller:1");
        assert_eq!(entry.ttl_secs, 600);
    }

    #[tokio::test]
    async fn test_loader_invoked() {
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = CountingLoader {
            calls: calls.clone(),
        };
        let entries = loader.load().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
