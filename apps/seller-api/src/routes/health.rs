//! Health endpoints.

use axum::extract::State;
use axum::http::StatusCode;

use crate::state::AppState;

/// GET `/health/live` — process is up.
pub async fn live() -> &'static str {
    "ok"
}

/// GET `/health/ready` — database reachable.
pub async fn ready(State(state): State<AppState>) -> StatusCode {
    match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
