//! Upstream failure taxonomy.
//!
//! Every outbound marketplace call is classified into one of a small set of
//! failure kinds; retry orchestration, circuit accounting, and credential
//! deactivation all key off this classification rather than off raw status
//! codes scattered through call sites.

use serde::Serialize;
use thiserror::Error;

/// Classification of a single failed upstream call, produced at the HTTP
/// boundary before any retry decision is made.
#[derive(Debug, Clone, Error)]
pub enum UpstreamFailure {
    /// 5xx, timeout, or connection error. Retryable, counts toward the
    /// circuit breaker.
    #[error("transient upstream failure: {detail}")]
    Transient {
        /// HTTP status if one was received.
        status: Option<u16>,
        /// Human-readable description of the failure.
        detail: String,
    },

    /// 429 from upstream. Retryable with a mandated delay, never counted
    /// as a circuit failure.
    #[error("upstream rate limited")]
    RateLimited {
        /// Server-provided Retry-After in seconds, if present.
        retry_after_secs: Option<u64>,
    },

    /// 401/403 — the delegated credential was rejected.
    #[error("credential rejected with status {status}: {detail}")]
    CredentialRejected {
        /// HTTP status (401 or 403).
        status: u16,
        /// Upstream error body, recorded verbatim for operators.
        detail: String,
    },

    /// Any other 4xx — a caller error, surfaced immediately and not
    /// counted toward upstream instability.
    #[error("upstream rejected request with status {status}: {detail}")]
    Rejected {
        /// HTTP status.
        status: u16,
        /// Upstream error body.
        detail: String,
    },
}

impl UpstreamFailure {
    /// Classify an HTTP status code plus error body.
    ///
    /// Statuses below 400 are not failures and map to `Rejected` only as a
    /// defensive fallback; callers should not classify successful responses.
    #[must_use]
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            429 => Self::RateLimited {
                retry_after_secs: None,
            },
            401 | 403 => Self::CredentialRejected {
                status,
                detail: body.to_string(),
            },
            500..=599 => Self::Transient {
                status: Some(status),
                detail: body.to_string(),
            },
            _ => Self::Rejected {
                status,
                detail: body.to_string(),
            },
        }
    }

    /// True when a retry within the attempt budget may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::RateLimited { .. })
    }

    /// True when this failure counts toward opening the circuit.
    #[must_use]
    pub fn counts_toward_circuit(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Terminal outcome of a gateway `execute` call.
///
/// Consumers must handle three shapes: transient coordination outcomes
/// (`CircuitOpen`, `RateLimited`) which may be deferred and retried later,
/// credential problems, and terminal upstream errors.
#[derive(Debug, Clone, Error, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayError {
    /// The circuit for this scope is open; no network call was made.
    #[error("circuit open for scope '{scope}'")]
    CircuitOpen {
        /// The scope whose circuit is open.
        scope: String,
    },

    /// The local ceiling or the upstream rejected the call for rate; retry
    /// after the indicated delay.
    #[error("rate limited, retry in {retry_after_secs}s")]
    RateLimited {
        /// Seconds until the caller should retry.
        retry_after_secs: u64,
    },

    /// The delegated credential is invalid and could not be refreshed.
    #[error("invalid credential: {detail}")]
    InvalidCredential {
        /// Upstream error detail, verbatim.
        detail: String,
    },

    /// Retry budget exhausted against a degraded upstream.
    #[error("upstream unavailable: {detail}")]
    TransientUpstream {
        /// Description of the final attempt's failure.
        detail: String,
    },

    /// A non-retryable upstream rejection (4xx other than 401/403/429).
    #[error("upstream rejected request ({status}): {detail}")]
    UpstreamRejected {
        /// HTTP status.
        status: u16,
        /// Upstream error body.
        detail: String,
    },

    /// The shared coordination store failed.
    #[error("storage error: {detail}")]
    Storage {
        /// Description of the storage failure.
        detail: String,
    },
}

/// Failure acquiring an access token for a gateway call.
#[derive(Debug, Clone, Error)]
pub enum TokenError {
    /// The tenant has no linked credential for the requested account.
    #[error("no active credential for tenant")]
    NoActiveCredential,

    /// The credential was deactivated after a terminal refresh failure.
    #[error("credential inactive: {0}")]
    CredentialInactive(String),

    /// The token endpoint is inside a rate-limit backoff window.
    #[error("token endpoint rate limited, retry in {retry_after_secs}s")]
    RateLimited {
        /// Seconds until the backoff window closes.
        retry_after_secs: u64,
    },

    /// The refresh call failed terminally.
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    /// The credential store failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<TokenError> for GatewayError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::RateLimited { retry_after_secs } => {
                GatewayError::RateLimited { retry_after_secs }
            }
            TokenError::Storage(detail) => GatewayError::Storage { detail },
            other => GatewayError::InvalidCredential {
                detail: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_rate_limited() {
        let failure = UpstreamFailure::from_status(429, "slow down");
        assert!(matches!(failure, UpstreamFailure::RateLimited { .. }));
        assert!(failure.is_retryable());
        assert!(!failure.counts_toward_circuit());
    }

    #[test]
    fn test_classify_credential_rejected() {
        for status in [401, 403] {
            let failure = UpstreamFailure::from_status(status, "bad token");
            assert!(
                matches!(failure, UpstreamFailure::CredentialRejected { .. }),
                "status {status} should classify as credential rejection"
            );
            assert!(!failure.is_retryable());
        }
    }

    #[test]
    fn test_classify_server_errors_as_transient() {
        for status in [500, 502, 503, 504] {
            let failure = UpstreamFailure::from_status(status, "oops");
            assert!(failure.is_retryable());
            assert!(failure.counts_toward_circuit());
        }
    }

    #[test]
    fn test_classify_client_errors_as_rejected() {
        let failure = UpstreamFailure::from_status(404, "no such question");
        assert!(matches!(
            failure,
            UpstreamFailure::Rejected { status: 404, .. }
        ));
        assert!(!failure.is_retryable());
        assert!(!failure.counts_toward_circuit());
    }

    #[test]
    fn test_token_error_maps_into_gateway_error() {
        let err: GatewayError = TokenError::RateLimited {
            retry_after_secs: 30,
        }
        .into();
        assert!(matches!(
            err,
            GatewayError::RateLimited {
                retry_after_secs: 30
            }
        ));

        let err: GatewayError = TokenError::NoActiveCredential.into();
        assert!(matches!(err, GatewayError::InvalidCredential { .. }));
    }

    #[test]
    fn test_gateway_error_serializes_tagged() {
        let err = GatewayError::CircuitOpen {
            scope: "tenant:abc".to_string(),
        };
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"type\":\"circuit_open\""));
        assert!(json.contains("tenant:abc"));
    }
}
