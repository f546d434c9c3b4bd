//! Per-request lifecycle middleware
//!
//! Registers the request with the shutdown coordinator, opens its
//! `RequestScope`, and runs the rest of the stack under the scope's deadline.
//! Applied only to scoped routes.

use std::sync::Arc;

use axum::async_trait;
use axum::body::Body;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{info_span, warn, Instrument};

use super::response::ApiError;
use crate::lifecycle::{GuardOutcome, RequestScope, ScopeError};
use crate::AppState;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Middleware that wraps a request in a registered, deadline-bound scope.
///
/// When the deadline fires first the handler future is dropped and the fixed
/// 504 body is the only response. When shutdown cancels the scope the fixed
/// 503 body replaces whatever the handler produced.
pub async fn request_lifecycle(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let _work = match state.shutdown.register() {
        Ok(work) => work,
        Err(_) => {
            tracing::debug!("Rejecting request during shutdown");
            return ApiError::from(ScopeError::Canceled).into_response();
        }
    };

    let scope = state.timeout_guard.open_scope(state.shutdown.token());
    let span = info_span!(
        "request",
        correlation_id = %scope.correlation_id(),
        method = %request.method(),
        path = %request.uri().path(),
    );
    request.extensions_mut().insert(scope.clone());

    let outcome = state
        .timeout_guard
        .run(&scope, next.run(request))
        .instrument(span.clone())
        .await;

    let mut response = match outcome {
        GuardOutcome::Completed(response) => response,
        GuardOutcome::TimedOut => {
            span.in_scope(|| warn!("Request exceeded its deadline"));
            ApiError::from(ScopeError::TimedOut).into_response()
        }
        GuardOutcome::Canceled => {
            span.in_scope(|| warn!("Request canceled by shutdown"));
            ApiError::from(ScopeError::Canceled).into_response()
        }
    };

    if let Ok(value) = HeaderValue::from_str(scope.correlation_id()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Handlers take the scope opened by [`request_lifecycle`] as an argument.
#[async_trait]
impl<S> FromRequestParts<S> for RequestScope
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<RequestScope>().cloned().ok_or_else(|| {
            tracing::error!("Handler mounted without the request lifecycle middleware");
            ApiError::internal()
        })
    }
}
