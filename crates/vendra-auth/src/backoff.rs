//! Global backoff window for the marketplace token endpoint.
//!
//! The token endpoint is authenticated by the application, not the tenant,
//! so a 429 there starves every flow at once. Hits are counted in the
//! shared `rate_limit_windows` store under a reserved scope; the window
//! grows with the hits recorded in the trailing hour and is capped at
//! five minutes. While a window is open no exchange or refresh call is
//! attempted.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use tokio::sync::RwLock;

use vendra_db::models::RateLimitWindow;

/// Reserved scope key for token-endpoint 429 accounting.
pub const TOKEN_BACKOFF_SCOPE: &str = "token-endpoint:global";

/// Hit-counting bucket width: one hour, so `hits_since` covers the
/// trailing hour with at most two bucket rows.
const HIT_BUCKET_SECS: i64 = 3600;

/// Seconds of backoff added per hit in the trailing hour.
const BACKOFF_SECS_PER_HIT: i64 = 60;

/// Backoff window ceiling in seconds.
const MAX_BACKOFF_SECS: i64 = 300;

/// Tracks the active backoff window and the shared hit counter.
#[derive(Debug)]
pub struct GlobalBackoff {
    pool: PgPool,
    window_until: RwLock<Option<DateTime<Utc>>>,
}

impl GlobalBackoff {
    /// Create a backoff tracker over the shared pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            window_until: RwLock::new(None),
        }
    }

    /// Seconds remaining in the active window, or `None` when calls may
    /// proceed.
    pub async fn remaining_secs(&self) -> Option<u64> {
        let until = (*self.window_until.read().await)?;
        let remaining = (until - Utc::now()).num_seconds();
        if remaining > 0 {
            Some(remaining as u64)
        } else {
            None
        }
    }

    /// Record one 429 from the token endpoint and open (or extend) the
    /// window sized by the trailing-hour hit count.
    ///
    /// Returns the window length in seconds. A failing store degrades to a
    /// single-hit window rather than failing the exchange — backoff is a
    /// protection, not a precondition.
    pub async fn record_rate_limit_hit(&self) -> u64 {
        let hits = match self.record_and_count().await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(
                    target: "auth_flow",
                    error = %e,
                    "Backoff hit accounting unavailable, using single-hit window"
                );
                1
            }
        };

        let backoff_secs = (BACKOFF_SECS_PER_HIT * hits.max(1)).min(MAX_BACKOFF_SECS);
        let until = Utc::now() + Duration::seconds(backoff_secs);

        let mut window = self.window_until.write().await;
        // Extend only; a longer window already in place wins.
        if window.map_or(true, |existing| existing < until) {
            *window = Some(until);
        }

        tracing::warn!(
            target: "auth_flow",
            hits_last_hour = hits,
            backoff_secs,
            "Token endpoint rate limited, global backoff window open"
        );

        backoff_secs as u64
    }

    async fn record_and_count(&self) -> Result<i64, sqlx::Error> {
        RateLimitWindow::record_hit(&self.pool, TOKEN_BACKOFF_SCOPE, HIT_BUCKET_SECS).await?;
        let since = Utc::now() - Duration::hours(1);
        RateLimitWindow::hits_since(&self.pool, TOKEN_BACKOFF_SCOPE, since).await
    }

    /// Drop the window (operator reset, tests).
    pub async fn clear(&self) {
        *self.window_until.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_growth_is_linear_and_capped() {
        let size = |hits: i64| (BACKOFF_SECS_PER_HIT * hits.max(1)).min(MAX_BACKOFF_SECS);
        assert_eq!(size(0), 60);
        assert_eq!(size(1), 60);
        assert_eq!(size(3), 180);
        assert_eq!(size(5), 300);
        assert_eq!(size(50), 300);
    }
}
