//! Idempotent enqueue and operator reprocessing.

use sqlx::PgPool;
use uuid::Uuid;

use vendra_db::models::{CreateIngestedEvent, IngestedEvent};

use crate::error::IngestError;

/// Outcome of an enqueue call.
#[derive(Debug)]
pub enum EnqueueOutcome {
    /// First delivery: a new row was created.
    Created(IngestedEvent),
    /// Duplicate delivery: the existing row is returned untouched.
    Duplicate(IngestedEvent),
}

impl EnqueueOutcome {
    /// The event row, whichever path produced it.
    #[must_use]
    pub fn event(&self) -> &IngestedEvent {
        match self {
            Self::Created(e) | Self::Duplicate(e) => e,
        }
    }
}

/// Queue facade over the `ingested_events` table.
#[derive(Debug, Clone)]
pub struct IngestQueue {
    pool: PgPool,
}

impl IngestQueue {
    /// Create the queue over the shared pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Natural event identity for a notification: `{topic}:{resource}`.
    /// Duplicate deliveries of the same notification collapse onto it.
    #[must_use]
    pub fn event_identity(topic: &str, resource: &str) -> String {
        format!("{topic}:{resource}")
    }

    /// Enqueue a notification, idempotently.
    ///
    /// A second delivery of the same identity is a no-op returning the
    /// existing row and its current status.
    pub async fn enqueue(&self, input: CreateIngestedEvent) -> Result<EnqueueOutcome, IngestError> {
        let event_id = input.event_id.clone();

        if let Some(created) = IngestedEvent::insert_if_absent(&self.pool, input).await? {
            tracing::info!(
                target: "ingest",
                event_id = %created.event_id,
                topic = %created.topic,
                "Event ingested"
            );
            return Ok(EnqueueOutcome::Created(created));
        }

        let existing = IngestedEvent::find_by_event_id(&self.pool, &event_id)
            .await?
            .ok_or_else(|| {
                // Insert conflicted but the row is gone: the queue never
                // deletes rows, so this indicates external interference.
                IngestError::MalformedNotification(format!(
                    "event '{event_id}' conflicted on insert but cannot be read back"
                ))
            })?;

        tracing::debug!(
            target: "ingest",
            event_id = %existing.event_id,
            status = %existing.status,
            "Duplicate delivery collapsed"
        );

        Ok(EnqueueOutcome::Duplicate(existing))
    }

    /// Operator- or system-triggered reprocessing of a failed event.
    ///
    /// Refused when the event already recorded a successful result — a
    /// forced status change must never produce a second downstream side
    /// effect.
    pub async fn reprocess(&self, id: Uuid) -> Result<(), IngestError> {
        let event = IngestedEvent::find_by_id(&self.pool, id)
            .await?
            .ok_or_else(|| IngestError::MalformedNotification(format!("no event with id {id}")))?;

        if event.has_result() {
            return Err(IngestError::AlreadyProcessed);
        }

        let requeued = IngestedEvent::requeue_failed(&self.pool, id).await?;
        if !requeued {
            return Err(IngestError::AlreadyProcessed);
        }

        tracing::info!(target: "ingest", event_id = %event.event_id, "Event requeued for reprocessing");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_identity_format() {
        assert_eq!(
            IngestQueue::event_identity("questions", "/questions/5036111111"),
            "questions:/questions/5036111111"
        );
    }
}
