//! Persisted circuit breaker state, shared by all instances.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Circuit breaker state row for one scope.
#[derive(Debug, Clone, FromRow)]
pub struct GatewayCircuitState {
    pub scope: String,
    pub state: String,
    pub failure_count: i32,
    pub opened_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Input for writing circuit state.
#[derive(Debug, Clone)]
pub struct UpsertCircuitState {
    pub scope: String,
    pub state: String,
    pub failure_count: i32,
    pub opened_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
}

impl GatewayCircuitState {
    /// Write-through the in-memory breaker state for a scope.
    pub async fn upsert(pool: &sqlx::PgPool, input: UpsertCircuitState) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            INSERT INTO gateway_circuit_states (
                scope, state, failure_count, opened_at, last_failure_at, last_success_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            ON CONFLICT (scope)
            DO UPDATE SET
                state = EXCLUDED.state,
                failure_count = EXCLUDED.failure_count,
                opened_at = EXCLUDED.opened_at,
                last_failure_at = EXCLUDED.last_failure_at,
                last_success_at = EXCLUDED.last_success_at,
                updated_at = NOW()
            ",
        )
        .bind(&input.scope)
        .bind(&input.state)
        .bind(input.failure_count)
        .bind(input.opened_at)
        .bind(input.last_failure_at)
        .bind(input.last_success_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Load the persisted state for a scope.
    pub async fn find_by_scope(
        pool: &sqlx::PgPool,
        scope: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM gateway_circuit_states WHERE scope = $1")
            .bind(scope)
            .fetch_optional(pool)
            .await
    }

    /// List all scopes whose circuit is currently open (operator view).
    pub async fn list_open(pool: &sqlx::PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM gateway_circuit_states WHERE state = 'open'")
            .fetch_all(pool)
            .await
    }

    /// Remove state for a scope (operator reset).
    pub async fn delete_by_scope(pool: &sqlx::PgPool, scope: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM gateway_circuit_states WHERE scope = $1")
            .bind(scope)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
