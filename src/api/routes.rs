use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::Method;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use super::middleware::request_lifecycle;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let lifecycle = middleware::from_fn_with_state(Arc::clone(&state), request_lifecycle);

    // Scoped routes -- each request is registered, deadline-bound and cancellable
    let session_routes = Router::new()
        .route(
            "/session",
            post(handlers::create_session).delete(handlers::revoke_session),
        )
        .route_layer(lifecycle.clone())
        .layer(cors(&[Method::POST, Method::DELETE, Method::OPTIONS]));

    let feed_routes = Router::new()
        .route("/feed", post(handlers::fetch_feed))
        .route_layer(lifecycle)
        .layer(cors(&[Method::POST, Method::OPTIONS]));

    // Probe routes -- answered outside any request scope
    let probe_routes = Router::new().route("/health", get(handlers::health));

    Router::new()
        .merge(session_routes)
        .merge(feed_routes)
        .merge(probe_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Echo the caller's origin; preflights are answered by the layer itself.
fn cors(methods: &[Method]) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(AllowMethods::list(methods.iter().cloned()))
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
}
