//! Handler for dispute/claim notifications.
//!
//! Claims carry deadlines, so their topic is registered with priority and
//! claimed ahead of routine questions. The handler itself is thin: it
//! validates the notification and records a routing result for the
//! operator-notification collaborator downstream.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use vendra_db::models::IngestedEvent;

use crate::error::HandlerError;
use crate::registry::TopicHandler;

/// Claim notification payload fields.
#[derive(Debug, Deserialize)]
struct ClaimNotification {
    resource: String,
}

/// The claims topic handler.
#[derive(Debug, Default)]
pub struct ClaimHandler;

impl ClaimHandler {
    /// Create the handler.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TopicHandler for ClaimHandler {
    fn topic(&self) -> &'static str {
        "claims"
    }

    async fn handle(&self, event: &IngestedEvent) -> Result<serde_json::Value, HandlerError> {
        let notification: ClaimNotification = serde_json::from_value(event.payload.clone())
            .map_err(|e| HandlerError::Terminal(format!("malformed claim notification: {e}")))?;

        let claim_id = notification
            .resource
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                HandlerError::Terminal(format!(
                    "claim resource '{}' has no claim id",
                    notification.resource
                ))
            })?;

        tracing::info!(
            target: "ingest_worker",
            event_id = %event.event_id,
            claim_id,
            "Claim routed for operator attention"
        );

        Ok(serde_json::json!({
            "claim_id": claim_id,
            "routed": "operator-notification",
            "routed_at": Utc::now(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn event(payload: serde_json::Value) -> IngestedEvent {
        IngestedEvent {
            id: Uuid::new_v4(),
            event_id: "claims:/claims/777".to_string(),
            topic: "claims".to_string(),
            payload,
            tenant_id: Some(Uuid::new_v4()),
            marketplace_user_id: Some("123".to_string()),
            status: "processing".to_string(),
            attempts: 0,
            last_error: None,
            result: None,
            next_attempt_at: Utc::now(),
            processing_started_at: Some(Utc::now()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_claim_is_routed() {
        let handler = ClaimHandler::new();
        let result = handler
            .handle(&event(serde_json::json!({
                "resource": "/claims/777",
                "topic": "claims"
            })))
            .await
            .unwrap();

        assert_eq!(result["claim_id"], "777");
        assert_eq!(result["routed"], "operator-notification");
    }

    #[tokio::test]
    async fn test_malformed_claim_is_terminal() {
        let handler = ClaimHandler::new();
        let err = handler
            .handle(&event(serde_json::json!({"topic": "claims"})))
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }
}
