//! The marketplace API client.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use thiserror::Error;

use vendra_cache::{CacheError, LayeredCache};
use vendra_core::{GatewayError, TenantId, UpstreamFailure};
use vendra_gateway::{EndpointClass, Gateway, Priority};

use crate::types::{Item, Question, SellerProfile};

/// TTL for cached item lookups, in seconds.
const ITEM_CACHE_TTL_SECS: i64 = 600;

/// TTL for cached seller profiles, in seconds.
const SELLER_CACHE_TTL_SECS: i64 = 900;

/// Marketplace client errors.
#[derive(Debug, Error)]
pub enum MarketplaceError {
    /// The gateway reported a transient or terminal call failure.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The upstream answered 2xx with a body this client cannot parse.
    #[error("malformed {resource} response: {detail}")]
    MalformedResponse {
        /// Which resource was being fetched.
        resource: &'static str,
        /// Parse failure description.
        detail: String,
    },

    /// The cache layer failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Typed client for marketplace resources, issued through the gateway.
#[derive(Clone)]
pub struct MarketplaceApi {
    gateway: Gateway,
    cache: LayeredCache,
    http: Client,
    base_url: String,
}

impl MarketplaceApi {
    /// Create the client.
    pub fn new(
        gateway: Gateway,
        cache: LayeredCache,
        base_url: String,
    ) -> Result<Self, MarketplaceError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| MarketplaceError::MalformedResponse {
                resource: "client",
                detail: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            gateway,
            cache,
            http,
            base_url,
        })
    }

    /// Fetch a buyer question. Questions are never cached — their status
    /// drives the ingestion state machine and must be current.
    pub async fn question(
        &self,
        tenant_id: TenantId,
        question_id: &str,
    ) -> Result<Question, MarketplaceError> {
        let value = self
            .get_json(
                tenant_id,
                EndpointClass::Read,
                Priority::Normal,
                format!("{}/questions/{question_id}", self.base_url),
            )
            .await?;
        parse("question", value)
    }

    /// Fetch a listing, cached with tenant and item tags.
    pub async fn item(&self, tenant_id: TenantId, item_id: &str) -> Result<Item, MarketplaceError> {
        let cache_key = format!("item:{item_id}");
        if let Some(cached) = self.cached_value(&cache_key).await {
            if let Ok(item) = serde_json::from_value::<Item>(cached) {
                return Ok(item);
            }
        }

        let value = self
            .get_json(
                tenant_id,
                EndpointClass::Read,
                Priority::Normal,
                format!("{}/items/{item_id}", self.base_url),
            )
            .await?;
        let item: Item = parse("item", value.clone())?;

        let tags = vec![format!("tenant:{tenant_id}"), format!("item:{item_id}")];
        if let Err(e) = self
            .cache
            .set(&cache_key, &value, &tags, ITEM_CACHE_TTL_SECS)
            .await
        {
            tracing::warn!(target: "marketplace", key = %cache_key, error = %e, "Item cache write failed");
        }

        Ok(item)
    }

    /// Fetch the seller profile behind the tenant's credential, cached.
    pub async fn seller_profile(
        &self,
        tenant_id: TenantId,
    ) -> Result<SellerProfile, MarketplaceError> {
        let cache_key = format!("seller:{tenant_id}");
        if let Some(cached) = self.cached_value(&cache_key).await {
            if let Ok(profile) = serde_json::from_value::<SellerProfile>(cached) {
                return Ok(profile);
            }
        }

        let value = self
            .get_json(
                tenant_id,
                EndpointClass::Read,
                Priority::Normal,
                format!("{}/users/me", self.base_url),
            )
            .await?;
        let profile: SellerProfile = parse("seller profile", value.clone())?;

        let tags = vec![
            format!("tenant:{tenant_id}"),
            format!("seller:{}", profile.id),
        ];
        if let Err(e) = self
            .cache
            .set(&cache_key, &value, &tags, SELLER_CACHE_TTL_SECS)
            .await
        {
            tracing::warn!(target: "marketplace", key = %cache_key, error = %e, "Profile cache write failed");
        }

        Ok(profile)
    }

    /// Post an answer to a question. Mutation class, high priority: an
    /// operator-approved reply should not queue behind enrichment reads.
    pub async fn answer_question(
        &self,
        tenant_id: TenantId,
        question_id: i64,
        text: &str,
    ) -> Result<(), MarketplaceError> {
        let url = format!("{}/answers", self.base_url);
        let body = serde_json::json!({ "question_id": question_id, "text": text });
        let http = self.http.clone();

        self.gateway
            .execute(
                tenant_id,
                EndpointClass::Mutation,
                Priority::High,
                move |token| {
                    let http = http.clone();
                    let url = url.clone();
                    let body = body.clone();
                    async move {
                        let response = http
                            .post(&url)
                            .bearer_auth(&token.token)
                            .json(&body)
                            .send()
                            .await
                            .map_err(request_failure)?;
                        let status = response.status().as_u16();
                        if (200..300).contains(&status) {
                            Ok(())
                        } else {
                            let body = response.text().await.unwrap_or_default();
                            Err(UpstreamFailure::from_status(status, &body))
                        }
                    }
                },
            )
            .await?;

        Ok(())
    }

    /// Cache lookup that degrades to a miss when the store is down — a
    /// broken cache must cost extra upstream calls, not failed reads.
    async fn cached_value(&self, key: &str) -> Option<serde_json::Value> {
        match self.cache.get(key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(target: "marketplace", key, error = %e, "Cache read failed");
                None
            }
        }
    }

    /// GET a marketplace URL through the gateway, returning the raw JSON.
    async fn get_json(
        &self,
        tenant_id: TenantId,
        class: EndpointClass,
        priority: Priority,
        url: String,
    ) -> Result<serde_json::Value, MarketplaceError> {
        let http = self.http.clone();
        let value = self
            .gateway
            .execute(tenant_id, class, priority, move |token| {
                let http = http.clone();
                let url = url.clone();
                async move {
                    let response = http
                        .get(&url)
                        .bearer_auth(&token.token)
                        .send()
                        .await
                        .map_err(request_failure)?;
                    let status = response.status().as_u16();
                    if (200..300).contains(&status) {
                        response.json::<serde_json::Value>().await.map_err(|e| {
                            UpstreamFailure::Transient {
                                status: Some(status),
                                detail: format!("unreadable response body: {e}"),
                            }
                        })
                    } else {
                        let body = response.text().await.unwrap_or_default();
                        Err(UpstreamFailure::from_status(status, &body))
                    }
                }
            })
            .await?;
        Ok(value)
    }
}

/// Classify a reqwest transport error.
fn request_failure(e: reqwest::Error) -> UpstreamFailure {
    let detail = if e.is_timeout() {
        "request timeout".to_string()
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else {
        format!("request error: {e}")
    };
    UpstreamFailure::Transient {
        status: None,
        detail,
    }
}

/// Parse a 2xx body into its typed form.
fn parse<T: DeserializeOwned>(
    resource: &'static str,
    value: serde_json::Value,
) -> Result<T, MarketplaceError> {
    serde_json::from_value(value).map_err(|e| MarketplaceError::MalformedResponse {
        resource,
        detail: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reports_resource_and_detail() {
        let err = parse::<Question>("question", serde_json::json!({"id": 1}))
            .unwrap_err();
        match err {
            MarketplaceError::MalformedResponse { resource, detail } => {
                assert_eq!(resource, "question");
                assert!(detail.contains("missing field"));
            }
            other => panic!("expected MalformedResponse, got {other:?}"),
        }
    }
}
