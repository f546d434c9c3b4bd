use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::auth::BearerToken;
use crate::api::response::{ApiError, AppJson};
use crate::lifecycle::RequestScope;
use crate::tokens::Credentials;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub session_token: String,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    scope: RequestScope,
    AppJson(credentials): AppJson<Credentials>,
) -> Result<Json<SessionResponse>, ApiError> {
    let username = credentials.username.clone();
    let user_id = state
        .sessions
        .authenticate_by_credentials(&scope, credentials)
        .await?;
    let token = state.sessions.issue_token(&scope, user_id).await?;

    tracing::info!(user_id, username = %username, "Login succeeded");
    Ok(Json(SessionResponse {
        session_token: token,
    }))
}

pub async fn revoke_session(
    State(state): State<Arc<AppState>>,
    scope: RequestScope,
    BearerToken(token): BearerToken,
) -> Result<StatusCode, ApiError> {
    state.sessions.revoke_token(&scope, &token).await?;
    Ok(StatusCode::OK)
}
