//! Scope-aware outbound GET.

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;
use tracing::debug;

use crate::lifecycle::{RequestScope, ScopeError};

use super::guard::FetchTarget;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Scope(#[from] ScopeError),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("response body exceeds {0} bytes")]
    BodyTooLarge(usize),
}

/// Status and raw body of an upstream response
#[derive(Debug)]
pub struct FetchResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

/// Shared outbound HTTP client for user-directed fetches.
///
/// Redirects are not followed: a redirect target never went through
/// [`FetchGuard`](super::FetchGuard).
#[derive(Clone)]
pub struct FeedClient {
    http: reqwest::Client,
    max_body_bytes: usize,
    timeout: Duration,
}

impl FeedClient {
    pub fn new(timeout: Duration, max_body_bytes: usize) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .pool_idle_timeout(Duration::from_secs(30))
            .timeout(timeout)
            .user_agent(concat!("morbo/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_http(http, timeout, max_body_bytes))
    }

    /// Wrap a preconfigured client. It should not follow redirects.
    pub fn with_http(http: reqwest::Client, timeout: Duration, max_body_bytes: usize) -> Self {
        Self {
            http,
            max_body_bytes,
            timeout,
        }
    }

    /// GET `target` within `scope`.
    ///
    /// The scope is checked before the request goes out and again before the
    /// body is handed back, so a result that arrives after cancellation or
    /// the deadline is never delivered.
    pub async fn get(
        &self,
        scope: &RequestScope,
        target: &FetchTarget,
    ) -> Result<FetchResponse, ClientError> {
        scope.check()?;

        let timeout = self.timeout.min(scope.remaining());
        let mut response = self
            .http
            .get(target.url.clone())
            .timeout(timeout)
            .send()
            .await?;
        let status = response.status();

        if let Some(len) = response.content_length() {
            if len > self.max_body_bytes as u64 {
                return Err(ClientError::BodyTooLarge(self.max_body_bytes));
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > self.max_body_bytes {
                return Err(ClientError::BodyTooLarge(self.max_body_bytes));
            }
            body.extend_from_slice(&chunk);
        }

        scope.check()?;
        debug!(host = %target.host, status = status.as_u16(), bytes = body.len(), "Fetched upstream");
        Ok(FetchResponse { status, body })
    }
}
