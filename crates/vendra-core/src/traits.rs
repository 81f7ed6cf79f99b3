//! Seam traits between the resilience crates.
//!
//! The gateway needs tokens without depending on the auth crate, and the
//! ingestion worker needs answers without depending on any concrete AI
//! client. Both seams live here so the dependency graph stays acyclic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::TokenError;
use crate::ids::TenantId;

/// A decrypted access token handed to the gateway for one call.
#[derive(Debug, Clone)]
pub struct AccessToken {
    /// Bearer token value. Lives only in process memory.
    pub token: String,
    /// Upstream expiry of the token.
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// True when the token expires within the given safety margin.
    #[must_use]
    pub fn expires_within(&self, margin_secs: i64) -> bool {
        self.expires_at <= Utc::now() + chrono::Duration::seconds(margin_secs)
    }
}

/// Supplies valid access tokens for a tenant's linked marketplace account,
/// refreshing proactively when expiry is near.
///
/// Implemented by the credential service in `vendra-auth`; injected into the
/// gateway at construction.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    /// Return a valid access token for the tenant, refreshing first when the
    /// stored token is within the provider's expiry safety margin.
    async fn access_token(&self, tenant_id: TenantId) -> Result<AccessToken, TokenError>;

    /// Force-refresh after an upstream 401/403, returning the new token.
    ///
    /// Called at most once per gateway call; a second rejection deactivates
    /// the credential.
    async fn refresh_token(&self, tenant_id: TenantId) -> Result<AccessToken, TokenError>;

    /// Deactivate the tenant's credential after a repeated upstream
    /// rejection, recording the upstream error verbatim.
    async fn mark_invalid(&self, tenant_id: TenantId, detail: &str) -> Result<(), TokenError>;
}

/// Input to the AI answer pipeline for one buyer question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRequest {
    /// Tenant that owns the linked seller account.
    pub tenant_id: TenantId,
    /// Marketplace question identifier.
    pub question_id: String,
    /// The buyer's question text.
    pub question_text: String,
    /// Title of the listing the question was asked on.
    pub item_title: Option<String>,
    /// Listing description, when available, for grounding the answer.
    pub item_description: Option<String>,
}

/// A generated answer suggestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerSuggestion {
    /// Suggested reply text.
    pub text: String,
    /// Identifier of the model or pipeline version that produced it.
    pub source: String,
    /// When the suggestion was produced.
    pub generated_at: DateTime<Utc>,
}

/// Failure from the answer pipeline collaborator.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The pipeline service is unreachable or degraded; the event attempt
    /// is retryable.
    #[error("pipeline unavailable: {0}")]
    Unavailable(String),

    /// The pipeline rejected the request as malformed; not retryable.
    #[error("pipeline rejected request: {0}")]
    Rejected(String),
}

impl PipelineError {
    /// True when the ingestion worker should retry the event.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// External AI pipeline that turns a buyer question into a suggested reply.
///
/// The ingestion worker treats this as an opaque collaborator; the concrete
/// HTTP client lives in `vendra-ingest`.
#[async_trait]
pub trait AnswerPipeline: Send + Sync {
    /// Generate an answer suggestion for one question.
    async fn suggest_answer(&self, request: AnswerRequest) -> Result<AnswerSuggestion, PipelineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_token_expiry_margin() {
        let soon = AccessToken {
            token: "t".to_string(),
            expires_at: Utc::now() + chrono::Duration::seconds(60),
        };
        assert!(soon.expires_within(600));
        assert!(!soon.expires_within(10));
    }

    #[test]
    fn test_pipeline_error_retryability() {
        assert!(PipelineError::Unavailable("down".to_string()).is_retryable());
        assert!(!PipelineError::Rejected("bad input".to_string()).is_retryable());
    }
}
