//! Background sweep of expired coordination rows.

use std::time::Duration;

use sqlx::PgPool;
use tokio::task::JoinHandle;

use vendra_db::models::{AuthHandshake, CacheRow, RateLimitWindow};

/// Default sweep interval.
pub const DEFAULT_JANITOR_INTERVAL: Duration = Duration::from_secs(600);

/// Interval task deleting expired handshakes, rate-limit buckets, and
/// cache entries.
pub struct AuthJanitor {
    pool: PgPool,
    interval: Duration,
}

impl AuthJanitor {
    /// Create a janitor with the default interval.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            interval: DEFAULT_JANITOR_INTERVAL,
        }
    }

    /// Override the sweep interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run a single sweep. Failures are logged; the next tick retries.
    pub async fn run_once(&self) {
        match AuthHandshake::cleanup_expired(&self.pool).await {
            Ok(swept) if swept > 0 => {
                tracing::info!(target: "auth_flow", swept, "Swept expired handshakes");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(target: "auth_flow", error = %e, "Handshake sweep failed");
            }
        }

        match RateLimitWindow::cleanup_expired(&self.pool).await {
            Ok(swept) if swept > 0 => {
                tracing::debug!(target: "gateway", swept, "Swept expired rate-limit windows");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(target: "gateway", error = %e, "Rate-limit window sweep failed");
            }
        }

        match CacheRow::cleanup_expired(&self.pool).await {
            Ok(swept) if swept > 0 => {
                tracing::debug!(target: "cache", swept, "Swept expired cache entries");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(target: "cache", error = %e, "Cache sweep failed");
            }
        }
    }

    /// Spawn the periodic sweep task.
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
