//! HTTP client for the marketplace token endpoint.
//!
//! One shared client for both grant types (`authorization_code` with PKCE,
//! `refresh_token`). The exchange path retries on transient failures with
//! an increasing delay schedule; the refresh path is a single attempt and
//! leaves retry policy to its caller. Both consult the global backoff
//! window before touching the network.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use crate::backoff::GlobalBackoff;
use crate::error::{AuthError, AuthResult};

/// Exchange retry delay schedule in seconds.
pub const EXCHANGE_RETRY_SCHEDULE_SECS: [u64; 5] = [5, 10, 20, 40, 60];

/// Maximum exchange attempts.
pub const MAX_EXCHANGE_ATTEMPTS: u32 = 5;

/// Per-request timeout for token endpoint calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Token endpoint configuration.
#[derive(Debug, Clone)]
pub struct TokenEndpointConfig {
    /// Full URL of the token endpoint.
    pub token_url: String,
    /// Application client ID.
    pub client_id: String,
    /// Application client secret.
    pub client_secret: String,
    /// Redirect URI registered with the marketplace.
    pub redirect_uri: String,
}

/// A successful token grant from the marketplace.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    /// The marketplace's identifier for the authorizing seller account.
    pub user_id: Option<i64>,
}

/// Error body shape returned by the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: Option<String>,
    message: Option<String>,
    error_description: Option<String>,
}

/// Outcome of a single token endpoint attempt, before retry policy.
#[derive(Debug)]
enum AttemptFailure {
    InvalidGrant(String),
    Rejected { status: u16, detail: String },
    RateLimited { retry_after_secs: Option<u64> },
    Transient { detail: String },
}

/// Client for the marketplace token endpoint.
#[derive(Clone)]
pub struct TokenClient {
    http: Client,
    config: TokenEndpointConfig,
    backoff: Arc<GlobalBackoff>,
    retry_schedule: Vec<Duration>,
}

impl TokenClient {
    /// Create a client with the default retry schedule.
    pub fn new(config: TokenEndpointConfig, backoff: Arc<GlobalBackoff>) -> AuthResult<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AuthError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            config,
            backoff,
            retry_schedule: EXCHANGE_RETRY_SCHEDULE_SECS
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect(),
        })
    }

    /// Override the retry delay schedule (tests use millisecond delays).
    #[must_use]
    pub fn with_retry_schedule(mut self, schedule: Vec<Duration>) -> Self {
        self.retry_schedule = schedule;
        self
    }

    /// Exchange an authorization code plus PKCE verifier for a token grant.
    ///
    /// Retries transient and rate-limited failures up to
    /// [`MAX_EXCHANGE_ATTEMPTS`] with the configured delay schedule.
    /// `invalid_grant` and other 4xx responses surface immediately.
    pub async fn exchange_code(&self, code: &str, verifier: &str) -> AuthResult<TokenGrant> {
        if let Some(wait) = self.backoff.remaining_secs().await {
            return Err(AuthError::RateLimited {
                retry_after_secs: wait,
            });
        }

        let mut last_detail = String::new();
        let mut last_was_rate_limit = false;

        for attempt in 1..=MAX_EXCHANGE_ATTEMPTS {
            let params = [
                ("grant_type", "authorization_code"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("code_verifier", verifier),
            ];

            match self.request_token(&params).await {
                Ok(grant) => {
                    if attempt > 1 {
                        tracing::info!(
                            target: "auth_flow",
                            attempt,
                            "Token exchange succeeded after retries"
                        );
                    }
                    return Ok(grant);
                }
                Err(AttemptFailure::InvalidGrant(detail)) => {
                    return Err(AuthError::InvalidGrant(detail));
                }
                Err(AttemptFailure::Rejected { status, detail }) => {
                    return Err(AuthError::ExchangeRejected { status, detail });
                }
                Err(AttemptFailure::RateLimited { retry_after_secs }) => {
                    let window = self.backoff.record_rate_limit_hit().await;
                    last_detail = "token endpoint returned 429".to_string();
                    last_was_rate_limit = true;

                    if attempt < MAX_EXCHANGE_ATTEMPTS {
                        let ladder = self.delay_for(attempt);
                        let hint = retry_after_secs.map(Duration::from_secs);
                        let wait = hint.map_or(ladder, |h| h.max(ladder));
                        tracing::warn!(
                            target: "auth_flow",
                            attempt,
                            wait_secs = wait.as_secs(),
                            window_secs = window,
                            "Token exchange rate limited, retrying"
                        );
                        tokio::time::sleep(wait).await;
                    }
                }
                Err(AttemptFailure::Transient { detail }) => {
                    last_detail = detail;
                    last_was_rate_limit = false;

                    if attempt < MAX_EXCHANGE_ATTEMPTS {
                        let wait = self.delay_for(attempt);
                        tracing::warn!(
                            target: "auth_flow",
                            attempt,
                            wait_secs = wait.as_secs(),
                            error = %last_detail,
                            "Token exchange failed, retrying"
                        );
                        tokio::time::sleep(wait).await;
                    }
                }
            }
        }

        if last_was_rate_limit {
            let wait = self.backoff.remaining_secs().await.unwrap_or(60);
            Err(AuthError::RateLimited {
                retry_after_secs: wait,
            })
        } else {
            Err(AuthError::Unavailable(last_detail))
        }
    }

    /// Call the refresh grant once. Retry policy belongs to the caller.
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenGrant> {
        if let Some(wait) = self.backoff.remaining_secs().await {
            return Err(AuthError::RateLimited {
                retry_after_secs: wait,
            });
        }

        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ];

        match self.request_token(&params).await {
            Ok(grant) => Ok(grant),
            Err(AttemptFailure::InvalidGrant(detail)) => Err(AuthError::InvalidGrant(detail)),
            Err(AttemptFailure::Rejected { status, detail }) => {
                Err(AuthError::ExchangeRejected { status, detail })
            }
            Err(AttemptFailure::RateLimited { retry_after_secs }) => {
                let window = self.backoff.record_rate_limit_hit().await;
                Err(AuthError::RateLimited {
                    retry_after_secs: retry_after_secs.unwrap_or(window),
                })
            }
            Err(AttemptFailure::Transient { detail }) => Err(AuthError::Unavailable(detail)),
        }
    }

    /// Delay after the given 1-based failed attempt.
    fn delay_for(&self, attempt: u32) -> Duration {
        let idx = (attempt as usize - 1).min(self.retry_schedule.len().saturating_sub(1));
        self.retry_schedule
            .get(idx)
            .copied()
            .unwrap_or(Duration::from_secs(60))
    }

    /// One POST to the token endpoint with classification of the outcome.
    async fn request_token(&self, params: &[(&str, &str)]) -> Result<TokenGrant, AttemptFailure> {
        let response = self
            .http
            .post(&self.config.token_url)
            .header("Accept", "application/json")
            .form(params)
            .send()
            .await
            .map_err(|e| {
                let detail = if e.is_timeout() {
                    "token endpoint timeout".to_string()
                } else if e.is_connect() {
                    format!("token endpoint connection failed: {e}")
                } else {
                    format!("token endpoint request error: {e}")
                };
                AttemptFailure::Transient { detail }
            })?;

        let status = response.status();

        if status.is_success() {
            return response.json::<TokenGrant>().await.map_err(|e| {
                AttemptFailure::Transient {
                    detail: format!("malformed token response: {e}"),
                }
            });
        }

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let body = response.text().await.unwrap_or_default();
        let parsed: Option<TokenErrorBody> = serde_json::from_str(&body).ok();
        let detail = parsed
            .as_ref()
            .and_then(|b| b.message.clone().or_else(|| b.error_description.clone()))
            .unwrap_or_else(|| body.chars().take(512).collect());

        match status.as_u16() {
            429 => Err(AttemptFailure::RateLimited {
                retry_after_secs: retry_after,
            }),
            400..=499 => {
                let code = parsed.and_then(|b| b.error).unwrap_or_default();
                if code == "invalid_grant" {
                    Err(AttemptFailure::InvalidGrant(detail))
                } else {
                    Err(AttemptFailure::Rejected {
                        status: status.as_u16(),
                        detail,
                    })
                }
            }
            _ => Err(AttemptFailure::Transient {
                detail: format!("token endpoint returned {status}: {detail}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_schedule_is_increasing() {
        for pair in EXCHANGE_RETRY_SCHEDULE_SECS.windows(2) {
            assert!(pair[1] > pair[0]);
        }
        assert_eq!(EXCHANGE_RETRY_SCHEDULE_SECS.len(), MAX_EXCHANGE_ATTEMPTS as usize);
    }

    #[test]
    fn test_token_grant_parses_marketplace_shape() {
        let json = r#"{
            "access_token": "APP_USR-123",
            "token_type": "Bearer",
            "expires_in": 21600,
            "scope": "offline_access read write",
            "user_id": 123456789,
            "refresh_token": "TG-abc"
        }"#;
        let grant: TokenGrant = serde_json::from_str(json).unwrap();
        assert_eq!(grant.access_token, "APP_USR-123");
        assert_eq!(grant.refresh_token.as_deref(), Some("TG-abc"));
        assert_eq!(grant.expires_in, 21600);
        assert_eq!(grant.user_id, Some(123456789));
    }

    #[test]
    fn test_token_grant_tolerates_missing_optional_fields() {
        let json = r#"{"access_token": "A", "expires_in": 3600}"#;
        let grant: TokenGrant = serde_json::from_str(json).unwrap();
        assert!(grant.refresh_token.is_none());
        assert!(grant.user_id.is_none());
    }
}
