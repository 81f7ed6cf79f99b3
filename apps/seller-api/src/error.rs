//! API error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use vendra_auth::AuthError;
use vendra_ingest::IngestError;

/// API error variants across the public endpoints.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("invalid webhook signature")]
    InvalidSignature,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

/// JSON error body returned by API endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            ApiError::InvalidSignature => (StatusCode::UNAUTHORIZED, "invalid_signature"),
            ApiError::Auth(err) => match err {
                AuthError::InvalidState | AuthError::ExpiredState | AuthError::InvalidGrant(_) => {
                    (StatusCode::BAD_REQUEST, "authorization_failed")
                }
                AuthError::RateLimited { .. } => {
                    (StatusCode::TOO_MANY_REQUESTS, "rate_limited")
                }
                AuthError::Unavailable(_) => (StatusCode::BAD_GATEWAY, "upstream_unavailable"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            },
            ApiError::Ingest(err) => match err {
                IngestError::MalformedNotification(_) => {
                    (StatusCode::BAD_REQUEST, "malformed_notification")
                }
                IngestError::AlreadyProcessed => (StatusCode::CONFLICT, "already_processed"),
                IngestError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
            },
            ApiError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message: self.to_string(),
            status: status.as_u16(),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    #[test]
    fn test_validation_maps_to_400() {
        let response = ApiError::Validation("bad payload".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_invalid_state_maps_to_400() {
        let response = ApiError::Auth(AuthError::InvalidState).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_rate_limited_maps_to_429() {
        let response = ApiError::Auth(AuthError::RateLimited {
            retry_after_secs: 60,
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_already_processed_maps_to_409() {
        let response = ApiError::Ingest(IngestError::AlreadyProcessed).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
