//! Authorization handshake rows: short-lived state for the OAuth flow.
//!
//! A handshake correlates an authorization redirect with its callback. It
//! is consumed (read-and-deleted) exactly once; concurrent callbacks for
//! the same `state` race on a single `DELETE ... RETURNING`, so at most one
//! caller observes the row.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Handshake lifetime in minutes.
pub const HANDSHAKE_EXPIRY_MINUTES: i64 = 20;

/// A pending authorization handshake.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AuthHandshake {
    pub id: Uuid,
    pub state: String,
    /// PKCE verifier stored as plain text; the row lives minutes and is
    /// deleted on consumption.
    pub code_verifier: String,
    pub tenant_id: Option<Uuid>,
    pub is_primary_login: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Input for creating a new handshake.
#[derive(Debug, Clone)]
pub struct CreateAuthHandshake {
    pub state: String,
    pub code_verifier: String,
    pub tenant_id: Option<Uuid>,
    pub is_primary_login: bool,
}

impl AuthHandshake {
    /// Persist a new handshake with the standard TTL.
    pub async fn create(
        pool: &sqlx::PgPool,
        input: CreateAuthHandshake,
    ) -> Result<Self, sqlx::Error> {
        let expires_at = Utc::now() + Duration::minutes(HANDSHAKE_EXPIRY_MINUTES);

        sqlx::query_as(
            r"
            INSERT INTO auth_handshakes (state, code_verifier, tenant_id, is_primary_login, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            ",
        )
        .bind(&input.state)
        .bind(&input.code_verifier)
        .bind(input.tenant_id)
        .bind(input.is_primary_login)
        .bind(expires_at)
        .fetch_one(pool)
        .await
    }

    /// Atomically consume the handshake matching `state`.
    ///
    /// Deletes and returns the row in one statement; exactly one of any
    /// number of concurrent callers receives `Some`. The returned row may
    /// already be past its expiry — callers must check [`Self::is_expired`].
    pub async fn consume_by_state(
        pool: &sqlx::PgPool,
        state: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            DELETE FROM auth_handshakes
            WHERE state = $1
            RETURNING *
            ",
        )
        .bind(state)
        .fetch_optional(pool)
        .await
    }

    /// Delete all expired handshakes. Returns the number swept.
    pub async fn cleanup_expired(pool: &sqlx::PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM auth_handshakes WHERE expires_at < NOW()")
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Check whether the handshake is past its expiry.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_check() {
        let live = AuthHandshake {
            id: Uuid::new_v4(),
            state: "s".to_string(),
            code_verifier: "v".to_string(),
            tenant_id: None,
            is_primary_login: true,
            created_at: Utc::now(),
            expires_at: Utc::now() + Duration::minutes(5),
        };
        assert!(!live.is_expired());

        let dead = AuthHandshake {
            expires_at: Utc::now() - Duration::seconds(1),
            ..live
        };
        assert!(dead.is_expired());
    }
}
