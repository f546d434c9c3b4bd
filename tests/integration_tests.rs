//! End-to-end tests through the HTTP router

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::routing::get;
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use morbo::config::Config;
use morbo::fetch::{FeedClient, Resolver};
use morbo::storage::models::User;
use morbo::storage::Database;
use morbo::tokens::password::hash_password;
use morbo::{api, AppState};

const ADMIN_PASSWORD: &str = "correct horse battery staple";

fn setup() -> (Router, Arc<AppState>, TempDir) {
    setup_with_client(None)
}

fn setup_with_client(feed_client: Option<FeedClient>) -> (Router, Arc<AppState>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::open(temp_dir.path(), "morbo").unwrap();
    db.put_user(&User {
        id: 1,
        username: "admin".to_string(),
        password_hash: hash_password(ADMIN_PASSWORD, 4).unwrap(),
    })
    .unwrap();

    let config = Config::from_lookup(|_| None).unwrap();
    let mut hosts = HashMap::new();
    hosts.insert(
        "intranet.example.com".to_string(),
        vec!["10.0.0.5".parse().unwrap()],
    );
    hosts.insert(
        "feeds.example.com".to_string(),
        vec!["93.184.216.34".parse().unwrap()],
    );
    let mut state = AppState::new(config, db, Resolver::Static(hosts)).unwrap();
    if let Some(client) = feed_client {
        state.feed_client = client;
    }
    let state = Arc::new(state);
    (api::create_router(Arc::clone(&state)), state, temp_dir)
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn login(username: &str, password: &str) -> Request<Body> {
    Request::post("/session")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::json!({ "username": username, "password": password }).to_string(),
        ))
        .unwrap()
}

fn fetch(token: &str, url: &str) -> Request<Body> {
    Request::post("/feed")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from(serde_json::json!({ "url": url }).to_string()))
        .unwrap()
}

fn logout(token: &str) -> Request<Body> {
    Request::delete("/session")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

async fn login_token(router: &Router) -> String {
    let (status, body) = send(router, login("admin", ADMIN_PASSWORD)).await;
    assert_eq!(status, StatusCode::OK);
    body["sessionToken"].as_str().unwrap().to_string()
}

const SAMPLE_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example News</title>
    <link>https://feeds.example.com/</link>
    <description>Things that happened</description>
    <item><title>One</title></item>
    <item><title>Two</title></item>
  </channel>
</rss>"#;

/// Upstream stand-in. It is reached as an HTTP proxy, so requests for
/// `http://feeds.example.com/...` arrive here and route by path.
fn upstream_router() -> Router {
    Router::new()
        .route("/feed.xml", get(|| async { SAMPLE_RSS }))
        .route(
            "/missing",
            get(|| async { (StatusCode::NOT_FOUND, "no such feed") }),
        )
        .route("/empty", get(|| async { StatusCode::NO_CONTENT }))
        .route("/big", get(|| async { "x".repeat(4096) }))
        .route("/binary", get(|| async { vec![0xffu8, 0xfe, 0x00, 0x3c] }))
        .route("/html", get(|| async { "<html><body>hi</body></html>" }))
}

async fn serve_upstream() -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, upstream_router()).await.unwrap();
    });
    addr
}

fn proxied_client(proxy: std::net::SocketAddr) -> FeedClient {
    let http = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .proxy(reqwest::Proxy::http(format!("http://{proxy}")).unwrap())
        .build()
        .unwrap();
    FeedClient::with_http(http, Duration::from_secs(5), 1024)
}

#[tokio::test]
async fn test_login_then_blocked_metadata_fetch() {
    let (router, _state, _temp) = setup();

    let (status, body) = send(&router, login("admin", "wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], "fail");

    let token = login_token(&router).await;
    // 40 random bytes, unpadded base64url
    assert_eq!(token.len(), 54);
    assert!(token
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));

    let (status, body) = send(
        &router,
        fetch(&token, "http://169.254.169.254/latest/meta-data"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["data"]["message"]
        .as_str()
        .unwrap()
        .contains("not allowed"));
}

#[tokio::test]
async fn test_feed_validation_failures_are_bad_request() {
    let (router, _state, _temp) = setup();
    let token = login_token(&router).await;

    for url in [
        "http://localhost/x",
        "ftp://example.com/x",
        "https://intranet.example.com/feed",
        "https://example.com:8443/feed",
        "not a url",
    ] {
        let (status, _) = send(&router, fetch(&token, url)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{url}");
    }
}

#[tokio::test]
async fn test_feed_requires_valid_bearer() {
    let (router, _state, _temp) = setup();

    let (status, _) = send(&router, fetch("not-a-session", "https://example.com/feed.xml")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let missing_header = Request::post("/feed")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"url":"https://example.com/feed.xml"}"#))
        .unwrap();
    let (status, _) = send(&router, missing_header).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let wrong_scheme = Request::post("/feed")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, "Basic YWRtaW46cGFzcw==")
        .body(Body::from(r#"{"url":"https://example.com/feed.xml"}"#))
        .unwrap();
    let (status, _) = send(&router, wrong_scheme).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_revoked_token_stops_working() {
    let (router, _state, _temp) = setup();
    let token = login_token(&router).await;

    let (status, _) = send(&router, logout(&token)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&router, fetch(&token, "http://169.254.169.254/")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Revoking again is not an error
    let (status, _) = send(&router, logout(&token)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_logout_without_header_is_unauthorized() {
    let (router, _state, _temp) = setup();

    let request = Request::delete("/session").body(Body::empty()).unwrap();
    let (status, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_malformed_login_body() {
    let (router, _state, _temp) = setup();

    for body in ["{", "[]", r#"{"username":"admin"}"#] {
        let request = Request::post("/session")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap();
        let (status, json) = send(&router, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(
            json["data"]["message"],
            "couldn't parse the body as a JSON object"
        );
    }
}

#[tokio::test]
async fn test_other_methods_not_allowed() {
    let (router, _state, _temp) = setup();

    let (status, _) = send(
        &router,
        Request::get("/session").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let (status, _) = send(
        &router,
        Request::delete("/feed").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_cors_preflight_echoes_origin() {
    let (router, _state, _temp) = setup();

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/session")
        .header(header::ORIGIN, "https://app.example.com")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "DELETE")
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://app.example.com"
    );
    let methods = headers[header::ACCESS_CONTROL_ALLOW_METHODS].to_str().unwrap();
    assert!(methods.contains("DELETE"));
    assert!(headers
        .get_all(header::VARY)
        .iter()
        .any(|v| v.to_str().unwrap().contains("origin")));
}

#[tokio::test]
async fn test_scoped_responses_carry_request_id() {
    let (router, _state, _temp) = setup();

    let response = router
        .clone()
        .oneshot(login("admin", "wrong"))
        .await
        .unwrap();
    let request_id = response.headers()["x-request-id"].to_str().unwrap();
    assert_eq!(request_id.len(), 32);
}

#[tokio::test]
async fn test_shutdown_refuses_new_requests() {
    let (router, state, _temp) = setup();

    let (status, body) = send(
        &router,
        Request::get("/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    state.shutdown.begin_shutdown().await;

    let (status, body) = send(&router, login("admin", ADMIN_PASSWORD)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["message"], "the request has been canceled by the server");

    let (status, _) = send(
        &router,
        Request::get("/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(state.shutdown.outstanding(), 0);
}

#[tokio::test]
async fn test_login_accepts_json_without_content_type() {
    let (router, _state, _temp) = setup();

    let request = Request::post("/session")
        .body(Body::from(r#"{"username":"admin","password":"wrong"}"#))
        .unwrap();
    let (status, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], "fail");

    let request = Request::post("/session")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from(
            serde_json::json!({ "username": "admin", "password": ADMIN_PASSWORD }).to_string(),
        ))
        .unwrap();
    let (status, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["sessionToken"].is_string());
}

#[tokio::test]
async fn test_feed_summary() {
    let upstream = serve_upstream().await;
    let (router, _state, _temp) = setup_with_client(Some(proxied_client(upstream)));
    let token = login_token(&router).await;

    let (status, body) = send(
        &router,
        fetch(&token, "http://feeds.example.com/feed.xml"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Example News");
    assert_eq!(body["link"], "https://feeds.example.com/");
    assert_eq!(body["description"], "Things that happened");
    assert_eq!(body["itemCount"], 2);
}

#[tokio::test]
async fn test_feed_upstream_status_passes_through() {
    let upstream = serve_upstream().await;
    let (router, _state, _temp) = setup_with_client(Some(proxied_client(upstream)));
    let token = login_token(&router).await;

    let (status, body) = send(&router, fetch(&token, "http://feeds.example.com/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "fail");

    // Success codes other than 200 are not summarized either
    let response = router
        .clone()
        .oneshot(fetch(&token, "http://feeds.example.com/empty"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_feed_unreachable_upstream_is_bad_gateway() {
    // Bind then drop to get a port nobody listens on
    let closed = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let (router, _state, _temp) = setup_with_client(Some(proxied_client(closed)));
    let token = login_token(&router).await;

    let (status, body) = send(&router, fetch(&token, "http://feeds.example.com/feed.xml")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn test_feed_oversized_body_is_unprocessable() {
    let upstream = serve_upstream().await;
    let (router, _state, _temp) = setup_with_client(Some(proxied_client(upstream)));
    let token = login_token(&router).await;

    let (status, body) = send(&router, fetch(&token, "http://feeds.example.com/big")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["data"]["message"], "response body exceeds 1024 bytes");
}

#[tokio::test]
async fn test_feed_unreadable_body_is_server_error() {
    let upstream = serve_upstream().await;
    let (router, state, _temp) = setup_with_client(Some(proxied_client(upstream)));
    let token = login_token(&router).await;

    for path in ["/binary", "/html"] {
        let url = format!("http://feeds.example.com{path}");
        let (status, body) = send(&router, fetch(&token, &url)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{path}");
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "internal server error");
    }
    assert_eq!(state.shutdown.outstanding(), 0);
}
