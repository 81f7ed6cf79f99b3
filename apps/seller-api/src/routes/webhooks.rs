//! Inbound marketplace webhook endpoint.
//!
//! Responds 200 on successful enqueue — including duplicate deliveries,
//! which collapse onto the existing event — 4xx on malformed or unsigned
//! payloads, and 5xx only when the storage layer fails.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use vendra_db::models::{CreateIngestedEvent, MarketplaceCredential};
use vendra_ingest::{EnqueueOutcome, IngestQueue};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

/// TTL for cached webhook attribution entries, in seconds.
const ATTRIBUTION_CACHE_TTL_SECS: i64 = 900;

/// The marketplace notification envelope.
#[derive(Debug, Deserialize, Validate)]
pub struct MarketplaceNotification {
    /// Resource path the notification refers to (e.g. `/questions/123`).
    #[validate(length(min = 1))]
    pub resource: String,
    /// Notification topic (e.g. `questions`, `claims`).
    #[validate(length(min = 1))]
    pub topic: String,
    /// Marketplace user the notification belongs to.
    pub user_id: Option<i64>,
}

/// Response body for an accepted notification.
#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAccepted {
    /// `accepted` for a first delivery, `duplicate` otherwise.
    pub outcome: String,
    /// The event's natural identity.
    pub event_id: String,
    /// Current processing status of the event.
    pub status: String,
}

/// POST `/webhooks/marketplace`.
pub async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookAccepted>> {
    if let Some(secret) = &state.webhook_secret {
        verify_signature(secret, &headers, &body)?;
    }

    let raw: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::Validation(format!("invalid JSON body: {e}")))?;
    let notification: MarketplaceNotification = serde_json::from_value(raw.clone())
        .map_err(|e| ApiError::Validation(format!("invalid notification: {e}")))?;
    notification
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let (tenant_id, marketplace_user_id) =
        attribute_tenant(&state, notification.user_id).await?;

    let outcome = state
        .queue
        .enqueue(CreateIngestedEvent {
            event_id: IngestQueue::event_identity(&notification.topic, &notification.resource),
            topic: notification.topic.clone(),
            payload: raw,
            tenant_id,
            marketplace_user_id,
        })
        .await?;

    let (label, event) = match &outcome {
        EnqueueOutcome::Created(e) => ("accepted", e),
        EnqueueOutcome::Duplicate(e) => ("duplicate", e),
    };

    Ok(Json(WebhookAccepted {
        outcome: label.to_string(),
        event_id: event.event_id.clone(),
        status: event.status.clone(),
    }))
}

/// Resolve the tenant behind a marketplace user ID, cache first.
async fn attribute_tenant(
    state: &AppState,
    user_id: Option<i64>,
) -> ApiResult<(Option<Uuid>, Option<String>)> {
    let Some(user_id) = user_id else {
        return Ok((None, None));
    };
    let marketplace_user_id = user_id.to_string();

    let cache_key = format!("credential:user:{marketplace_user_id}");
    match state.cache.get(&cache_key).await {
        Ok(Some(value)) => {
            if let Some(tenant) = value
                .get("tenant_id")
                .and_then(|v| v.as_str())
                .and_then(|s| Uuid::parse_str(s).ok())
            {
                return Ok((Some(tenant), Some(marketplace_user_id)));
            }
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(target: "ingest", error = %e, "Attribution cache read failed");
        }
    }

    let credential =
        MarketplaceCredential::find_by_marketplace_user(&state.pool, &marketplace_user_id).await?;

    let Some(credential) = credential else {
        tracing::warn!(
            target: "ingest",
            marketplace_user_id = %marketplace_user_id,
            "Notification for unlinked marketplace user"
        );
        return Ok((None, Some(marketplace_user_id)));
    };

    let value = serde_json::json!({ "tenant_id": credential.tenant_id });
    let tags = vec![
        "credentials".to_string(),
        format!("tenant:{}", credential.tenant_id),
    ];
    if let Err(e) = state
        .cache
        .set(&cache_key, &value, &tags, ATTRIBUTION_CACHE_TTL_SECS)
        .await
    {
        tracing::warn!(target: "ingest", error = %e, "Attribution cache write failed");
    }

    Ok((Some(credential.tenant_id), Some(marketplace_user_id)))
}

/// Verify the HMAC-SHA256 webhook signature from the `x-signature` header.
fn verify_signature(secret: &str, headers: &HeaderMap, body: &[u8]) -> ApiResult<()> {
    let provided = headers
        .get("x-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::InvalidSignature)?;

    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .map_err(|_| ApiError::InvalidSignature)?;
    mac.update(body);
    let computed = hex::encode(mac.finalize().into_bytes());

    let matches: bool = computed.as_bytes().ct_eq(provided.as_bytes()).into();
    if matches {
        Ok(())
    } else {
        Err(ApiError::InvalidSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn signed_headers(secret: &str, body: &[u8]) -> HeaderMap {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let sig = hex::encode(mac.finalize().into_bytes());

        let mut headers = HeaderMap::new();
        headers.insert("x-signature", HeaderValue::from_str(&sig).unwrap());
        headers
    }

    #[test]
    fn test_valid_signature_accepted() {
        let body = br#"{"resource":"/questions/1","topic":"questions"}"#;
        let headers = signed_headers("shared-secret", body);
        assert!(verify_signature("shared-secret", &headers, body).is_ok());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let body = b"payload";
        let headers = signed_headers("other-secret", body);
        assert!(verify_signature("shared-secret", &headers, body).is_err());
    }

    #[test]
    fn test_missing_header_rejected() {
        assert!(verify_signature("secret", &HeaderMap::new(), b"payload").is_err());
    }

    #[test]
    fn test_tampered_body_rejected() {
        let headers = signed_headers("secret", b"original");
        assert!(verify_signature("secret", &headers, b"tampered").is_err());
    }

    #[test]
    fn test_notification_validation() {
        let ok: MarketplaceNotification = serde_json::from_value(serde_json::json!({
            "resource": "/questions/1",
            "topic": "questions",
            "user_id": 42
        }))
        .unwrap();
        assert!(ok.validate().is_ok());

        let empty: MarketplaceNotification = serde_json::from_value(serde_json::json!({
            "resource": "",
            "topic": "questions"
        }))
        .unwrap();
        assert!(empty.validate().is_err());
    }
}
