use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::api::auth::BearerToken;
use crate::api::response::{ApiError, AppJson};
use crate::fetch::{parse_feed, FeedError, FeedSummary};
use crate::lifecycle::RequestScope;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct FeedRequest {
    pub url: String,
}

/// Authenticate, validate the URL, fetch it and summarize the feed.
///
/// Any upstream status other than 200 is passed through to the caller. A body
/// that is not UTF-8 or not RSS is a server error.
pub async fn fetch_feed(
    State(state): State<Arc<AppState>>,
    scope: RequestScope,
    BearerToken(token): BearerToken,
    AppJson(req): AppJson<FeedRequest>,
) -> Result<Json<FeedSummary>, ApiError> {
    let user_id = state
        .sessions
        .authenticate_by_token(&scope, &token)
        .await?;

    scope.check()?;
    let target = state.fetch_guard.validate(&req.url).await?;

    let response = state.feed_client.get(&scope, &target).await?;
    if response.status != StatusCode::OK {
        tracing::info!(
            user_id,
            host = %target.host,
            status = response.status.as_u16(),
            "Upstream returned an error status"
        );
        return Err(ApiError::from_status(
            response.status,
            format!("upstream responded with {}", response.status),
        ));
    }

    let body = std::str::from_utf8(&response.body)
        .map_err(|_| FeedError::NotUtf8)?;
    let summary = parse_feed(body)?;

    tracing::debug!(
        user_id,
        host = %target.host,
        items = summary.item_count,
        "Fetched feed"
    );
    Ok(Json(summary))
}
