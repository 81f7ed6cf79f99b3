//! Ingested marketplace events and their processing state machine.
//!
//! `received → processing → {completed | failed}`. Rows are never deleted
//! here; terminal states are retained for audit. Re-entry into `received`
//! is permitted only for rows without a recorded result, which is what
//! makes reprocessing safe against duplicate downstream side effects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Processing status of an ingested event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Accepted and waiting for a worker.
    #[default]
    Received,
    /// Claimed by a worker.
    Processing,
    /// Handler succeeded; result recorded.
    Completed,
    /// Retry budget exhausted; final error recorded.
    Failed,
}

impl EventStatus {
    /// Convert to the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse from the database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "received" => Some(Self::Received),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// True for `completed` and `failed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// An ingested marketplace notification.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct IngestedEvent {
    pub id: Uuid,
    /// Natural dedup key: `{topic}:{resource}` from the notification.
    pub event_id: String,
    pub topic: String,
    pub payload: serde_json::Value,
    pub tenant_id: Option<Uuid>,
    pub marketplace_user_id: Option<String>,
    pub status: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    /// Successful handler output (e.g. the persisted answer suggestion).
    /// Non-null result blocks any reprocessing.
    pub result: Option<serde_json::Value>,
    pub next_attempt_at: DateTime<Utc>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for ingesting a notification.
#[derive(Debug, Clone)]
pub struct CreateIngestedEvent {
    pub event_id: String,
    pub topic: String,
    pub payload: serde_json::Value,
    pub tenant_id: Option<Uuid>,
    pub marketplace_user_id: Option<String>,
}

impl IngestedEvent {
    /// Insert the event if no row with this `event_id` exists.
    ///
    /// Returns `None` on conflict — the caller then reads the existing row.
    /// This is the idempotent-ingestion primitive: under concurrent
    /// deliveries exactly one insert wins.
    pub async fn insert_if_absent(
        pool: &sqlx::PgPool,
        input: CreateIngestedEvent,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            INSERT INTO ingested_events (event_id, topic, payload, tenant_id, marketplace_user_id)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (event_id) DO NOTHING
            RETURNING *
            ",
        )
        .bind(&input.event_id)
        .bind(&input.topic)
        .bind(&input.payload)
        .bind(input.tenant_id)
        .bind(&input.marketplace_user_id)
        .fetch_optional(pool)
        .await
    }

    /// Find an event by its natural identity.
    pub async fn find_by_event_id(
        pool: &sqlx::PgPool,
        event_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM ingested_events WHERE event_id = $1")
            .bind(event_id)
            .fetch_optional(pool)
            .await
    }

    /// Find an event by row ID.
    pub async fn find_by_id(pool: &sqlx::PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM ingested_events WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Claim up to `limit` due events, priority topics first.
    ///
    /// Claimed rows move to `processing` with a fresh
    /// `processing_started_at`. `FOR UPDATE SKIP LOCKED` keeps concurrent
    /// workers from claiming the same rows.
    pub async fn claim_due(
        pool: &sqlx::PgPool,
        limit: i64,
        priority_topics: &[String],
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            UPDATE ingested_events
            SET status = 'processing', processing_started_at = NOW(), updated_at = NOW()
            WHERE id IN (
                SELECT id FROM ingested_events
                WHERE status = 'received' AND next_attempt_at <= NOW()
                ORDER BY (topic = ANY($2)) DESC, next_attempt_at ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            ",
        )
        .bind(limit)
        .bind(priority_topics)
        .fetch_all(pool)
        .await
    }

    /// Record handler success: terminal `completed` with the result stored.
    pub async fn mark_completed(
        pool: &sqlx::PgPool,
        id: Uuid,
        result: &serde_json::Value,
    ) -> Result<bool, sqlx::Error> {
        let updated = sqlx::query(
            r"
            UPDATE ingested_events
            SET status = 'completed', result = $2, last_error = NULL,
                processing_started_at = NULL, updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            ",
        )
        .bind(id)
        .bind(result)
        .execute(pool)
        .await?;
        Ok(updated.rows_affected() > 0)
    }

    /// Record a failed attempt.
    ///
    /// With `next_attempt_at` set the row returns to `received` for a later
    /// retry; without it the row becomes terminal `failed`.
    pub async fn mark_attempt_failed(
        pool: &sqlx::PgPool,
        id: Uuid,
        error: &str,
        next_attempt_at: Option<DateTime<Utc>>,
    ) -> Result<bool, sqlx::Error> {
        let updated = match next_attempt_at {
            Some(next) => {
                sqlx::query(
                    r"
                    UPDATE ingested_events
                    SET status = 'received', attempts = attempts + 1, last_error = $2,
                        next_attempt_at = $3, processing_started_at = NULL, updated_at = NOW()
                    WHERE id = $1
                    ",
                )
                .bind(id)
                .bind(error)
                .bind(next)
                .execute(pool)
                .await?
            }
            None => {
                sqlx::query(
                    r"
                    UPDATE ingested_events
                    SET status = 'failed', attempts = attempts + 1, last_error = $2,
                        processing_started_at = NULL, updated_at = NOW()
                    WHERE id = $1
                    ",
                )
                .bind(id)
                .bind(error)
                .execute(pool)
                .await?
            }
        };
        Ok(updated.rows_affected() > 0)
    }

    /// Reset events stuck in `processing` longer than `stale_after_secs`
    /// back to `received`.
    ///
    /// Only rows without a result are reclaimed — a crash after the
    /// downstream side effect but before the status write must not cause
    /// a second dispatch.
    pub async fn reclaim_stalled(
        pool: &sqlx::PgPool,
        stale_after_secs: i64,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r"
            UPDATE ingested_events
            SET status = 'received', processing_started_at = NULL, updated_at = NOW()
            WHERE status = 'processing'
              AND result IS NULL
              AND processing_started_at < NOW() - make_interval(secs => $1)
            ",
        )
        .bind(stale_after_secs as f64)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Re-enter a failed event into the queue (operator reprocessing).
    ///
    /// Refused for rows that already carry a result; returns `false` in
    /// that case so the caller can surface the refusal.
    pub async fn requeue_failed(pool: &sqlx::PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r"
            UPDATE ingested_events
            SET status = 'received', next_attempt_at = NOW(),
                processing_started_at = NULL, updated_at = NOW()
            WHERE id = $1 AND status = 'failed' AND result IS NULL
            ",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Typed view of the status column.
    #[must_use]
    pub fn event_status(&self) -> EventStatus {
        EventStatus::parse(&self.status).unwrap_or_default()
    }

    /// True when the event already produced a successful result.
    #[must_use]
    pub fn has_result(&self) -> bool {
        self.result.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            EventStatus::Received,
            EventStatus::Processing,
            EventStatus::Completed,
            EventStatus::Failed,
        ] {
            assert_eq!(EventStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_status_parse_invalid() {
        assert_eq!(EventStatus::parse("archived"), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(EventStatus::Completed.is_terminal());
        assert!(EventStatus::Failed.is_terminal());
        assert!(!EventStatus::Received.is_terminal());
        assert!(!EventStatus::Processing.is_terminal());
    }

    #[test]
    fn test_unknown_status_defaults_to_received() {
        let event = IngestedEvent {
            id: Uuid::new_v4(),
            event_id: "questions:Q1".to_string(),
            topic: "questions".to_string(),
            payload: serde_json::json!({}),
            tenant_id: None,
            marketplace_user_id: None,
            status: "bogus".to_string(),
            attempts: 0,
            last_error: None,
            result: None,
            next_attempt_at: Utc::now(),
            processing_started_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(event.event_status(), EventStatus::Received);
        assert!(!event.has_result());
    }
}
