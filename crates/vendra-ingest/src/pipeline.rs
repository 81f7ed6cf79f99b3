//! HTTP client for the external AI answer pipeline.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;

use vendra_core::{AnswerPipeline, AnswerRequest, AnswerSuggestion, PipelineError};

/// Response shape of the answer pipeline service.
#[derive(Debug, Deserialize)]
struct PipelineResponse {
    answer: String,
    #[serde(default)]
    model: Option<String>,
}

/// Reqwest-backed [`AnswerPipeline`] implementation.
#[derive(Clone)]
pub struct HttpAnswerPipeline {
    http: Client,
    endpoint: String,
}

impl HttpAnswerPipeline {
    /// Create a pipeline client for the given endpoint.
    pub fn new(endpoint: String) -> Result<Self, PipelineError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| PipelineError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, endpoint })
    }
}

#[async_trait]
impl AnswerPipeline for HttpAnswerPipeline {
    async fn suggest_answer(
        &self,
        request: AnswerRequest,
    ) -> Result<AnswerSuggestion, PipelineError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PipelineError::Unavailable("pipeline timeout".to_string())
                } else {
                    PipelineError::Unavailable(format!("pipeline request failed: {e}"))
                }
            })?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Rejected(format!(
                "pipeline rejected request ({status}): {body}"
            )));
        }
        if !status.is_success() {
            return Err(PipelineError::Unavailable(format!(
                "pipeline returned {status}"
            )));
        }

        let parsed: PipelineResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Unavailable(format!("malformed pipeline response: {e}")))?;

        Ok(AnswerSuggestion {
            text: parsed.answer,
            source: parsed.model.unwrap_or_else(|| "answer-pipeline".to_string()),
            generated_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vendra_core::TenantId;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> AnswerRequest {
        AnswerRequest {
            tenant_id: TenantId::new(),
            question_id: "5036111111".to_string(),
            question_text: "Does it ship tomorrow?".to_string(),
            item_title: Some("USB-C Cable 2m".to_string()),
            item_description: None,
        }
    }

    #[tokio::test]
    async fn test_suggestion_parsed_from_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/suggest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "answer": "Yes, orders before 3pm ship same day.",
                "model": "assist-v2"
            })))
            .mount(&server)
            .await;

        let pipeline = HttpAnswerPipeline::new(format!("{}/suggest", server.uri())).unwrap();
        let suggestion = pipeline.suggest_answer(request()).await.unwrap();

        assert!(suggestion.text.contains("same day"));
        assert_eq!(suggestion.source, "assist-v2");
    }

    #[tokio::test]
    async fn test_client_error_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/suggest"))
            .respond_with(ResponseTemplate::new(422).set_body_string("question too long"))
            .mount(&server)
            .await;

        let pipeline = HttpAnswerPipeline::new(format!("{}/suggest", server.uri())).unwrap();
        let err = pipeline.suggest_answer(request()).await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/suggest"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let pipeline = HttpAnswerPipeline::new(format!("{}/suggest", server.uri())).unwrap();
        let err = pipeline.suggest_answer(request()).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
