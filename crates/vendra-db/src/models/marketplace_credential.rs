//! Delegated marketplace credentials.
//!
//! One row per linked seller account. Token material is stored only as
//! vault ciphertext; rotation replaces both tokens and the expiry in a
//! single statement so a concurrent reader never observes a half-rotated
//! pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A stored delegated credential for one marketplace seller account.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MarketplaceCredential {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// The marketplace's identifier for the seller account.
    pub marketplace_user_id: String,
    pub access_token_cipher: String,
    pub refresh_token_cipher: String,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub is_primary: bool,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for storing a newly exchanged credential.
#[derive(Debug, Clone)]
pub struct CreateMarketplaceCredential {
    pub tenant_id: Uuid,
    pub marketplace_user_id: String,
    pub access_token_cipher: String,
    pub refresh_token_cipher: String,
    pub expires_at: DateTime<Utc>,
    pub is_primary: bool,
}

impl MarketplaceCredential {
    /// Insert or replace the credential for `(tenant, marketplace user)`.
    ///
    /// Re-authorizing an already linked account overwrites the stored pair
    /// and reactivates the row.
    pub async fn upsert(
        pool: &sqlx::PgPool,
        input: CreateMarketplaceCredential,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r"
            INSERT INTO marketplace_credentials (
                tenant_id, marketplace_user_id, access_token_cipher,
                refresh_token_cipher, expires_at, is_primary
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (tenant_id, marketplace_user_id)
            DO UPDATE SET
                access_token_cipher = EXCLUDED.access_token_cipher,
                refresh_token_cipher = EXCLUDED.refresh_token_cipher,
                expires_at = EXCLUDED.expires_at,
                is_primary = EXCLUDED.is_primary,
                is_active = TRUE,
                last_error = NULL,
                updated_at = NOW()
            RETURNING *
            ",
        )
        .bind(input.tenant_id)
        .bind(&input.marketplace_user_id)
        .bind(&input.access_token_cipher)
        .bind(&input.refresh_token_cipher)
        .bind(input.expires_at)
        .bind(input.is_primary)
        .fetch_one(pool)
        .await
    }

    /// Find a credential by ID.
    pub async fn find_by_id(pool: &sqlx::PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM marketplace_credentials WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find the active primary credential for a tenant, falling back to any
    /// active credential when no primary is linked.
    pub async fn find_active_for_tenant(
        pool: &sqlx::PgPool,
        tenant_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM marketplace_credentials
            WHERE tenant_id = $1 AND is_active
            ORDER BY is_primary DESC, updated_at DESC
            LIMIT 1
            ",
        )
        .bind(tenant_id)
        .fetch_optional(pool)
        .await
    }

    /// Find the tenant owning a marketplace user ID (webhook attribution).
    pub async fn find_by_marketplace_user(
        pool: &sqlx::PgPool,
        marketplace_user_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM marketplace_credentials
            WHERE marketplace_user_id = $1 AND is_active
            ORDER BY updated_at DESC
            LIMIT 1
            ",
        )
        .bind(marketplace_user_id)
        .fetch_optional(pool)
        .await
    }

    /// List all active credentials (cache warm-up source).
    pub async fn list_active(pool: &sqlx::PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM marketplace_credentials WHERE is_active")
            .fetch_all(pool)
            .await
    }

    /// Atomically replace both tokens and the expiry after a refresh,
    /// clearing any prior error flag.
    pub async fn rotate_tokens(
        pool: &sqlx::PgPool,
        id: Uuid,
        access_token_cipher: &str,
        refresh_token_cipher: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            UPDATE marketplace_credentials
            SET access_token_cipher = $2,
                refresh_token_cipher = $3,
                expires_at = $4,
                is_active = TRUE,
                last_error = NULL,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            ",
        )
        .bind(id)
        .bind(access_token_cipher)
        .bind(refresh_token_cipher)
        .bind(expires_at)
        .fetch_optional(pool)
        .await
    }

    /// Mark the credential inactive, recording the upstream error verbatim.
    pub async fn deactivate(
        pool: &sqlx::PgPool,
        id: Uuid,
        error: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r"
            UPDATE marketplace_credentials
            SET is_active = FALSE, last_error = $2, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(error)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// True when the stored access token expires within `margin_secs`.
    #[must_use]
    pub fn expires_within(&self, margin_secs: i64) -> bool {
        self.expires_at <= Utc::now() + chrono::Duration::seconds(margin_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(expires_at: DateTime<Utc>) -> MarketplaceCredential {
        MarketplaceCredential {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            marketplace_user_id: "12345".to_string(),
            access_token_cipher: "cipher-a".to_string(),
            refresh_token_cipher: "cipher-r".to_string(),
            expires_at,
            is_active: true,
            is_primary: true,
            last_error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_expires_within_margin() {
        let cred = credential(Utc::now() + chrono::Duration::minutes(5));
        assert!(cred.expires_within(600));
        assert!(!cred.expires_within(60));
    }

    #[test]
    fn test_already_expired_is_within_any_margin() {
        let cred = credential(Utc::now() - chrono::Duration::minutes(1));
        assert!(cred.expires_within(0));
    }
}
