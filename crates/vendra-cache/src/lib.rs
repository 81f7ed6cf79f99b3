//! Two-layer cache for marketplace lookups.
//!
//! L1 is a process-local TTL map; L2 is the shared `cache_entries` table.
//! L1 holds only keys the injected [`HotKeyPolicy`] marks hot, promoted
//! with a short TTL, so an L1 hit is never staler than L2 plus that
//! promotion TTL. Invalidation is by tag and clears both layers.

pub mod layered;
pub mod memory;
pub mod store;
pub mod warmup;

pub use layered::{HotKeyPolicy, LayeredCache, PrefixHotKeys};
pub use memory::{MemoryCache, MemoryCacheStats};
pub use store::CacheStore;
pub use warmup::{CacheWarmer, WarmEntry, WarmupLoader};

use thiserror::Error;

/// Cache operation errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The shared store failed.
    #[error("cache storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// A warm-up loader failed to produce its entries.
    #[error("warm-up loader '{loader}' failed: {detail}")]
    WarmupFailed {
        /// Loader name for the log line.
        loader: String,
        /// Failure description.
        detail: String,
    },
}
