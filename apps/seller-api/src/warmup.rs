//! Warm-up loaders for high-value cache keys.

use async_trait::async_trait;
use sqlx::PgPool;

use vendra_cache::{CacheError, WarmEntry, WarmupLoader};
use vendra_db::models::MarketplaceCredential;

/// TTL for warmed attribution entries, in seconds. Longer than the warm-up
/// interval so entries are refreshed before they expire.
const ATTRIBUTION_WARM_TTL_SECS: i64 = 900;

/// Refreshes webhook-attribution entries for every active credential, so
/// inbound notifications resolve their tenant without a database read.
pub struct CredentialWarmer {
    pool: PgPool,
}

impl CredentialWarmer {
    /// Create the loader.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WarmupLoader for CredentialWarmer {
    fn name(&self) -> &'static str {
        "credential-attribution"
    }

    async fn load(&self) -> Result<Vec<WarmEntry>, CacheError> {
        let credentials = MarketplaceCredential::list_active(&self.pool).await?;

        Ok(credentials
            .into_iter()
            .map(|credential| WarmEntry {
                key: format!("credential:user:{}", credential.marketplace_user_id),
                value: serde_json::json!({ "tenant_id": credential.tenant_id }),
                tags: vec![
                    "credentials".to_string(),
                    format!("tenant:{}", credential.tenant_id),
                ],
                ttl_secs: ATTRIBUTION_WARM_TTL_SECS,
            })
            .collect())
    }
}
