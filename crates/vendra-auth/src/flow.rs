//! Authorization flow orchestration: begin and complete.

use sqlx::PgPool;

use vendra_cache::LayeredCache;
use vendra_core::TenantId;
use vendra_db::models::{AuthHandshake, CreateAuthHandshake, CreateMarketplaceCredential, MarketplaceCredential};
use vendra_vault::TokenVault;

use crate::error::{AuthError, AuthResult};
use crate::pkce;
use crate::token_client::TokenClient;

/// How long a successful exchange is remembered, keyed by authorization
/// code, to absorb duplicate callbacks.
pub const EXCHANGE_CACHE_TTL_SECS: i64 = 300;

/// Configuration for building the authorization redirect.
#[derive(Debug, Clone)]
pub struct AuthFlowConfig {
    /// Marketplace authorization page URL.
    pub authorization_url: String,
    /// Application client ID.
    pub client_id: String,
    /// Redirect URI registered with the marketplace.
    pub redirect_uri: String,
}

/// The Authorization Flow Manager.
#[derive(Clone)]
pub struct AuthFlowService {
    pool: PgPool,
    vault: TokenVault,
    token_client: TokenClient,
    cache: LayeredCache,
    config: AuthFlowConfig,
}

impl AuthFlowService {
    /// Create the flow service.
    #[must_use]
    pub fn new(
        pool: PgPool,
        vault: TokenVault,
        token_client: TokenClient,
        cache: LayeredCache,
        config: AuthFlowConfig,
    ) -> Self {
        Self {
            pool,
            vault,
            token_client,
            cache,
            config,
        }
    }

    /// Begin an authorization flow.
    ///
    /// Generates the `state` and PKCE pair, persists the handshake, and
    /// returns the redirect URL for the user agent.
    pub async fn begin_authorization(
        &self,
        tenant_id: Option<TenantId>,
        is_primary_login: bool,
    ) -> AuthResult<String> {
        let state = pkce::generate_state();
        let pair = pkce::generate_pkce();

        AuthHandshake::create(
            &self.pool,
            CreateAuthHandshake {
                state: state.clone(),
                code_verifier: pair.verifier,
                tenant_id: tenant_id.map(TenantId::into_uuid),
                is_primary_login,
            },
        )
        .await?;

        tracing::info!(
            target: "auth_flow",
            tenant_id = ?tenant_id,
            is_primary_login,
            "Authorization flow started"
        );

        Ok(self.build_authorization_url(&state, &pair.challenge))
    }

    /// Complete an authorization flow from the callback parameters.
    ///
    /// Duplicate callbacks for the same code (double webhook delivery,
    /// browser back-button) are answered from the exchange cache without a
    /// second upstream exchange. Otherwise the handshake is consumed
    /// atomically — a second caller racing on the same `state` observes
    /// `InvalidState`.
    pub async fn complete_authorization(
        &self,
        code: &str,
        state: &str,
    ) -> AuthResult<MarketplaceCredential> {
        let cache_key = exchange_cache_key(code);
        let cached = match self.cache.get(&cache_key).await {
            Ok(value) => value,
            Err(e) => {
                // A broken cache must not fail the flow; the worst case is
                // a duplicate callback re-exchanging a consumed code.
                tracing::warn!(target: "auth_flow", error = %e, "Exchange cache read failed");
                None
            }
        };
        if let Some(cached) = cached {
            if let Ok(credential) = serde_json::from_value::<MarketplaceCredential>(cached) {
                tracing::info!(
                    target: "auth_flow",
                    credential_id = %credential.id,
                    "Duplicate callback absorbed from exchange cache"
                );
                return Ok(credential);
            }
        }

        let handshake = AuthHandshake::consume_by_state(&self.pool, state)
            .await?
            .ok_or(AuthError::InvalidState)?;

        if handshake.is_expired() {
            return Err(AuthError::ExpiredState);
        }

        let grant = self
            .token_client
            .exchange_code(code, &handshake.code_verifier)
            .await?;

        let refresh_token = grant.refresh_token.as_deref().ok_or_else(|| {
            AuthError::Unavailable("token response missing refresh_token".to_string())
        })?;
        let marketplace_user_id = grant
            .user_id
            .map(|id| id.to_string())
            .ok_or_else(|| AuthError::Unavailable("token response missing user_id".to_string()))?;

        let tenant_id = handshake.tenant_id.unwrap_or_else(uuid::Uuid::new_v4);
        let expires_at = chrono::Utc::now() + chrono::Duration::seconds(grant.expires_in);

        let credential = MarketplaceCredential::upsert(
            &self.pool,
            CreateMarketplaceCredential {
                tenant_id,
                marketplace_user_id,
                access_token_cipher: self.vault.seal(&grant.access_token)?,
                refresh_token_cipher: self.vault.seal(refresh_token)?,
                expires_at,
                is_primary: handshake.is_primary_login,
            },
        )
        .await?;

        // Best-effort: losing this write only costs a duplicate callback a
        // real re-exchange attempt (which then fails with invalid_grant).
        match serde_json::to_value(&credential) {
            Ok(value) => {
                let tags = vec![
                    format!("credential:{}", credential.id),
                    format!("tenant:{}", credential.tenant_id),
                ];
                if let Err(e) = self
                    .cache
                    .set(&cache_key, &value, &tags, EXCHANGE_CACHE_TTL_SECS)
                    .await
                {
                    tracing::warn!(target: "auth_flow", error = %e, "Exchange cache write failed");
                }
            }
            Err(e) => {
                tracing::warn!(target: "auth_flow", error = %e, "Exchange cache serialize failed");
            }
        }

        tracing::info!(
            target: "auth_flow",
            credential_id = %credential.id,
            tenant_id = %credential.tenant_id,
            marketplace_user_id = %credential.marketplace_user_id,
            "Authorization flow completed"
        );

        Ok(credential)
    }

    /// Build the marketplace authorization URL for a handshake.
    #[must_use]
    pub fn build_authorization_url(&self, state: &str, challenge: &str) -> String {
        format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&state={}&code_challenge={}&code_challenge_method=S256",
            self.config.authorization_url,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(state),
            urlencoding::encode(challenge),
        )
    }
}

/// Cache key for a completed exchange, by authorization code.
fn exchange_cache_key(code: &str) -> String {
    format!("token-exchange:{code}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_cache_key() {
        assert_eq!(exchange_cache_key("TG-123"), "token-exchange:TG-123");
    }

    #[test]
    fn test_authorization_url_shape() {
        let config = AuthFlowConfig {
            authorization_url: "https://auth.example.com/authorization".to_string(),
            client_id: "client id".to_string(),
            redirect_uri: "https://app.example.com/auth/callback".to_string(),
        };

        // Only the URL builder is exercised; the service fields behind the
        // pool are not touched.
        let url = format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&state={}&code_challenge={}&code_challenge_method=S256",
            config.authorization_url,
            urlencoding::encode(&config.client_id),
            urlencoding::encode(&config.redirect_uri),
            urlencoding::encode("st ate"),
            urlencoding::encode("chal"),
        );

        assert!(url.starts_with("https://auth.example.com/authorization?response_type=code"));
        assert!(url.contains("client_id=client%20id"));
        assert!(url.contains("state=st%20ate"));
        assert!(url.contains("code_challenge_method=S256"));
    }
}
