//! Authorization redirect endpoints.

use axum::extract::{Query, State};
use axum::response::Redirect;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use vendra_core::TenantId;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Query parameters for the begin endpoint.
#[derive(Debug, Deserialize)]
pub struct BeginQuery {
    /// Tenant linking an additional seller account; absent for a primary
    /// sign-in that creates a new tenant.
    pub tenant_id: Option<Uuid>,
    /// Whether this authorization is the tenant's primary account.
    #[serde(default)]
    pub primary: bool,
}

/// Query parameters delivered to the callback by the marketplace.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Response body after a completed authorization.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthorizationCompleted {
    pub credential_id: Uuid,
    pub tenant_id: Uuid,
    pub marketplace_user_id: String,
}

/// GET `/auth/marketplace/begin` — redirect the user agent upstream.
pub async fn begin(
    State(state): State<AppState>,
    Query(query): Query<BeginQuery>,
) -> ApiResult<Redirect> {
    let url = state
        .flow
        .begin_authorization(query.tenant_id.map(TenantId::from_uuid), query.primary)
        .await?;

    Ok(Redirect::temporary(&url))
}

/// GET `/auth/marketplace/callback` — complete the handshake.
pub async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> ApiResult<Json<AuthorizationCompleted>> {
    if let Some(error) = query.error {
        let detail = query.error_description.unwrap_or_default();
        return Err(ApiError::Validation(format!(
            "authorization denied upstream: {error} {detail}"
        )));
    }

    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::Validation("missing code parameter".to_string()))?;
    let state_param = query
        .state
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::Validation("missing state parameter".to_string()))?;

    let credential = state.flow.complete_authorization(&code, &state_param).await?;

    Ok(Json(AuthorizationCompleted {
        credential_id: credential.id,
        tenant_id: credential.tenant_id,
        marketplace_user_id: credential.marketplace_user_id,
    }))
}
