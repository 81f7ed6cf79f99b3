//! Handler for `questions` notifications.
//!
//! Fetches the question through the gateway, enriches it with the listing,
//! asks the answer pipeline for a suggestion, and records it as the event
//! result. The recorded result is what the no-silent-reprocessing guard
//! protects: once a suggestion exists, the event is never dispatched again.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use vendra_core::{AnswerPipeline, AnswerRequest, GatewayError, PipelineError, TenantId};
use vendra_db::models::IngestedEvent;
use vendra_marketplace::{MarketplaceApi, MarketplaceError, QuestionStatus};

use crate::error::HandlerError;
use crate::registry::TopicHandler;

/// Notification payload fields this handler needs.
#[derive(Debug, Deserialize)]
struct QuestionNotification {
    resource: String,
}

/// The questions topic handler.
pub struct QuestionHandler {
    marketplace: MarketplaceApi,
    pipeline: Arc<dyn AnswerPipeline>,
}

impl QuestionHandler {
    /// Create the handler.
    #[must_use]
    pub fn new(marketplace: MarketplaceApi, pipeline: Arc<dyn AnswerPipeline>) -> Self {
        Self {
            marketplace,
            pipeline,
        }
    }
}

#[async_trait]
impl TopicHandler for QuestionHandler {
    fn topic(&self) -> &'static str {
        "questions"
    }

    async fn handle(&self, event: &IngestedEvent) -> Result<serde_json::Value, HandlerError> {
        let tenant_id = event
            .tenant_id
            .map(TenantId::from_uuid)
            .ok_or_else(|| HandlerError::Terminal("event has no tenant attribution".to_string()))?;

        let question_id = question_id_from_payload(&event.payload)?;

        let question = self
            .marketplace
            .question(tenant_id, &question_id)
            .await
            .map_err(classify_marketplace)?;

        if question.status != QuestionStatus::Unanswered {
            // Answered or removed between delivery and processing; record
            // the observation so the event completes without AI dispatch.
            return Ok(serde_json::json!({
                "skipped": "question no longer unanswered",
                "question_id": question.id,
                "status": question.status,
            }));
        }

        // Listing context improves answers but is not required for one.
        let item = match self.marketplace.item(tenant_id, &question.item_id).await {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!(
                    target: "ingest_worker",
                    event_id = %event.event_id,
                    item_id = %question.item_id,
                    error = %e,
                    "Item enrichment failed, answering without listing context"
                );
                None
            }
        };

        let request = AnswerRequest {
            tenant_id,
            question_id: question.id.to_string(),
            question_text: question.text.clone(),
            item_title: item.as_ref().map(|i| i.title.clone()),
            item_description: item.as_ref().and_then(|i| i.permalink.clone()),
        };

        let suggestion = self
            .pipeline
            .suggest_answer(request)
            .await
            .map_err(classify_pipeline)?;

        let suggestion = serde_json::to_value(&suggestion)
            .map_err(|e| HandlerError::Terminal(format!("unserializable suggestion: {e}")))?;

        Ok(serde_json::json!({
            "question_id": question.id,
            "suggestion": suggestion,
        }))
    }
}

/// Extract the question ID from the notification's `resource` path
/// (`/questions/{id}`).
fn question_id_from_payload(payload: &serde_json::Value) -> Result<String, HandlerError> {
    let notification: QuestionNotification = serde_json::from_value(payload.clone())
        .map_err(|e| HandlerError::Terminal(format!("malformed notification payload: {e}")))?;

    let id = notification
        .resource
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            HandlerError::Terminal(format!(
                "notification resource '{}' has no question id",
                notification.resource
            ))
        })?;

    Ok(id.to_string())
}

/// Map marketplace failures onto attempt classification.
fn classify_marketplace(err: MarketplaceError) -> HandlerError {
    match err {
        MarketplaceError::Gateway(GatewayError::CircuitOpen { .. })
        | MarketplaceError::Gateway(GatewayError::RateLimited { .. })
        | MarketplaceError::Gateway(GatewayError::TransientUpstream { .. })
        | MarketplaceError::Gateway(GatewayError::Storage { .. })
        | MarketplaceError::Cache(_) => HandlerError::Retryable(err.to_string()),

        MarketplaceError::Gateway(GatewayError::InvalidCredential { .. })
        | MarketplaceError::Gateway(GatewayError::UpstreamRejected { .. })
        | MarketplaceError::MalformedResponse { .. } => HandlerError::Terminal(err.to_string()),
    }
}

/// Map pipeline failures onto attempt classification.
fn classify_pipeline(err: PipelineError) -> HandlerError {
    if err.is_retryable() {
        HandlerError::Retryable(err.to_string())
    } else {
        HandlerError::Terminal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_id_extraction() {
        let payload = serde_json::json!({
            "resource": "/questions/5036111111",
            "topic": "questions",
            "user_id": 123456789
        });
        assert_eq!(question_id_from_payload(&payload).unwrap(), "5036111111");
    }

    #[test]
    fn test_missing_resource_is_terminal() {
        let payload = serde_json::json!({"topic": "questions"});
        let err = question_id_from_payload(&payload).unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_empty_resource_is_terminal() {
        let payload = serde_json::json!({"resource": "", "topic": "questions"});
        assert!(question_id_from_payload(&payload).is_err());
    }

    #[test]
    fn test_transient_gateway_failures_are_retryable() {
        let err = classify_marketplace(MarketplaceError::Gateway(GatewayError::RateLimited {
            retry_after_secs: 30,
        }));
        assert!(err.is_retryable());

        let err = classify_marketplace(MarketplaceError::Gateway(GatewayError::CircuitOpen {
            scope: "tenant:x|read".to_string(),
        }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_credential_and_rejection_failures_are_terminal() {
        let err = classify_marketplace(MarketplaceError::Gateway(GatewayError::InvalidCredential {
            detail: "revoked".to_string(),
        }));
        assert!(!err.is_retryable());

        let err = classify_marketplace(MarketplaceError::Gateway(GatewayError::UpstreamRejected {
            status: 404,
            detail: "gone".to_string(),
        }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_pipeline_classification() {
        assert!(classify_pipeline(PipelineError::Unavailable("down".to_string())).is_retryable());
        assert!(!classify_pipeline(PipelineError::Rejected("bad".to_string())).is_retryable());
    }
}
