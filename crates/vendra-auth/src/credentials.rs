//! Credential access and serialized refresh.
//!
//! Refreshing rotates the refresh token upstream, so two concurrent
//! refreshes of the same credential would invalidate one side's new pair.
//! Each credential gets its own async mutex; a caller that arrives while a
//! refresh is in flight waits on the lock and then observes the rotated
//! row instead of triggering a second rotation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::PgPool;
use tokio::sync::Mutex;
use uuid::Uuid;

use vendra_core::{AccessToken, AccessTokenProvider, TenantId, TokenError};
use vendra_db::models::MarketplaceCredential;
use vendra_vault::TokenVault;

use crate::error::AuthError;
use crate::token_client::TokenClient;

/// Tokens expiring within this margin are refreshed before use.
pub const REFRESH_MARGIN_SECS: i64 = 600;

/// A forced refresh is skipped when the row was rotated this recently —
/// another process already completed the refresh this caller wanted.
const RECENT_ROTATION_SECS: i64 = 30;

/// Supplies decrypted access tokens and owns the refresh path.
pub struct CredentialService {
    pool: PgPool,
    vault: TokenVault,
    token_client: TokenClient,
    refresh_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl CredentialService {
    /// Create the service.
    #[must_use]
    pub fn new(pool: PgPool, vault: TokenVault, token_client: TokenClient) -> Self {
        Self {
            pool,
            vault,
            token_client,
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Refresh the credential, serialized per credential identity.
    ///
    /// With `force` false the refresh only happens when the token is within
    /// the expiry margin; with `force` true (after an upstream 401/403) the
    /// freshness check is skipped unless the row was rotated moments ago.
    pub async fn refresh_credential(
        &self,
        id: Uuid,
        force: bool,
    ) -> Result<AccessToken, TokenError> {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        // Re-read under the lock: a refresh that finished while this caller
        // waited already rotated the row.
        let credential = MarketplaceCredential::find_by_id(&self.pool, id)
            .await
            .map_err(|e| TokenError::Storage(e.to_string()))?
            .ok_or(TokenError::NoActiveCredential)?;

        if !credential.is_active {
            return Err(TokenError::CredentialInactive(
                credential.last_error.unwrap_or_default(),
            ));
        }

        let recently_rotated =
            credential.updated_at > Utc::now() - Duration::seconds(RECENT_ROTATION_SECS);
        let still_fresh = !credential.expires_within(REFRESH_MARGIN_SECS);

        if (!force && still_fresh) || (force && recently_rotated && still_fresh) {
            return self.decrypt_access(&credential);
        }

        let refresh_plain = self
            .vault
            .open(&credential.refresh_token_cipher)
            .map_err(|e| TokenError::RefreshFailed(format!("vault: {e}")))?;

        match self.token_client.refresh(&refresh_plain).await {
            Ok(grant) => {
                // The marketplace may omit rotation; keep the old refresh
                // token in that case.
                let new_refresh = grant.refresh_token.as_deref().unwrap_or(&refresh_plain);
                let expires_at = Utc::now() + Duration::seconds(grant.expires_in);

                let access_cipher = self
                    .vault
                    .seal(&grant.access_token)
                    .map_err(|e| TokenError::RefreshFailed(format!("vault: {e}")))?;
                let refresh_cipher = self
                    .vault
                    .seal(new_refresh)
                    .map_err(|e| TokenError::RefreshFailed(format!("vault: {e}")))?;

                MarketplaceCredential::rotate_tokens(
                    &self.pool,
                    id,
                    &access_cipher,
                    &refresh_cipher,
                    expires_at,
                )
                .await
                .map_err(|e| TokenError::Storage(e.to_string()))?;

                tracing::info!(
                    target: "auth_flow",
                    credential_id = %id,
                    "Credential refreshed"
                );

                Ok(AccessToken {
                    token: grant.access_token,
                    expires_at,
                })
            }
            Err(AuthError::RateLimited { retry_after_secs }) => {
                Err(TokenError::RateLimited { retry_after_secs })
            }
            Err(AuthError::InvalidGrant(detail)) => {
                self.deactivate(id, &detail).await;
                Err(TokenError::CredentialInactive(detail))
            }
            Err(AuthError::ExchangeRejected { status, detail }) => {
                let detail = format!("{status}: {detail}");
                self.deactivate(id, &detail).await;
                Err(TokenError::CredentialInactive(detail))
            }
            Err(other) => Err(TokenError::RefreshFailed(other.to_string())),
        }
    }

    /// Record the terminal refresh failure on the row.
    async fn deactivate(&self, id: Uuid, detail: &str) {
        tracing::warn!(
            target: "auth_flow",
            credential_id = %id,
            error = %detail,
            "Deactivating credential after terminal refresh failure"
        );
        if let Err(e) = MarketplaceCredential::deactivate(&self.pool, id, detail).await {
            tracing::error!(
                target: "auth_flow",
                credential_id = %id,
                error = %e,
                "Failed to record credential deactivation"
            );
        }
    }

    fn decrypt_access(&self, credential: &MarketplaceCredential) -> Result<AccessToken, TokenError> {
        let token = self
            .vault
            .open(&credential.access_token_cipher)
            .map_err(|e| TokenError::RefreshFailed(format!("vault: {e}")))?;
        Ok(AccessToken {
            token,
            expires_at: credential.expires_at,
        })
    }

    async fn lock_for(&self, id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.refresh_locks.lock().await;
        locks.entry(id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    async fn active_credential(
        &self,
        tenant_id: TenantId,
    ) -> Result<MarketplaceCredential, TokenError> {
        MarketplaceCredential::find_active_for_tenant(&self.pool, tenant_id.into_uuid())
            .await
            .map_err(|e| TokenError::Storage(e.to_string()))?
            .ok_or(TokenError::NoActiveCredential)
    }
}

#[async_trait]
impl AccessTokenProvider for CredentialService {
    async fn access_token(&self, tenant_id: TenantId) -> Result<AccessToken, TokenError> {
        let credential = self.active_credential(tenant_id).await?;

        if credential.expires_within(REFRESH_MARGIN_SECS) {
            return self.refresh_credential(credential.id, false).await;
        }

        self.decrypt_access(&credential)
    }

    async fn refresh_token(&self, tenant_id: TenantId) -> Result<AccessToken, TokenError> {
        let credential = self.active_credential(tenant_id).await?;
        self.refresh_credential(credential.id, true).await
    }

    async fn mark_invalid(&self, tenant_id: TenantId, detail: &str) -> Result<(), TokenError> {
        let credential = self.active_credential(tenant_id).await?;
        self.deactivate(credential.id, detail).await;
        Ok(())
    }
}
