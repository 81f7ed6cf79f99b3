//! Error types for the authorization flow.

use thiserror::Error;
use vendra_cache::CacheError;
use vendra_vault::VaultError;

/// Authorization flow error variants.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No live handshake matches the callback's `state` — either it never
    /// existed, was already consumed, or was swept after expiry.
    #[error("invalid or already used authorization state")]
    InvalidState,

    /// The handshake existed but its TTL had elapsed.
    #[error("authorization request expired")]
    ExpiredState,

    /// The upstream rejected the grant (`invalid_grant` class). The user
    /// must restart the authorization flow.
    #[error("authorization grant rejected: {0}")]
    InvalidGrant(String),

    /// The token endpoint rejected the request with a non-retryable 4xx.
    #[error("token endpoint rejected request ({status}): {detail}")]
    ExchangeRejected {
        /// HTTP status.
        status: u16,
        /// Upstream error body.
        detail: String,
    },

    /// The token endpoint is rate limited, or a global backoff window is
    /// active.
    #[error("token endpoint rate limited, retry in {retry_after_secs}s")]
    RateLimited {
        /// Seconds until the backoff window closes.
        retry_after_secs: u64,
    },

    /// Retry budget exhausted against a degraded token endpoint.
    #[error("token endpoint unavailable: {0}")]
    Unavailable(String),

    /// The requested credential does not exist.
    #[error("credential not found")]
    CredentialNotFound,

    /// Token encryption or decryption failed.
    #[error(transparent)]
    Vault(#[from] VaultError),

    /// The database failed.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// The cache layer failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Result alias for authorization flow operations.
pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    /// True when restarting the authorization flow is the only remedy.
    #[must_use]
    pub fn requires_reauthorization(&self) -> bool {
        matches!(
            self,
            Self::InvalidState | Self::ExpiredState | Self::InvalidGrant(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_flow_errors_require_reauthorization() {
        assert!(AuthError::InvalidState.requires_reauthorization());
        assert!(AuthError::ExpiredState.requires_reauthorization());
        assert!(AuthError::InvalidGrant("code used".to_string()).requires_reauthorization());
        assert!(!AuthError::RateLimited {
            retry_after_secs: 60
        }
        .requires_reauthorization());
        assert!(!AuthError::Unavailable("down".to_string()).requires_reauthorization());
    }
}
