//! Error types for the ingestion queue.

use thiserror::Error;

/// Queue and worker errors.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The database failed.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// The notification payload is missing required fields.
    #[error("malformed notification: {0}")]
    MalformedNotification(String),

    /// An event was requeued but already carries a result.
    #[error("event already has a recorded result")]
    AlreadyProcessed,
}

/// Failure returned by a topic handler for one processing attempt.
///
/// Retryability is declared by the handler — it knows whether the failure
/// came from a degraded upstream or from the event itself.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Transient; the attempt counts toward the retry budget.
    #[error("{0}")]
    Retryable(String),

    /// Permanent; the event goes straight to `failed`.
    #[error("{0}")]
    Terminal(String),
}

impl HandlerError {
    /// True when the worker should schedule another attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_error_retryability() {
        assert!(HandlerError::Retryable("upstream 503".to_string()).is_retryable());
        assert!(!HandlerError::Terminal("question deleted".to_string()).is_retryable());
    }
}
