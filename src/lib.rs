//! morbo - session-authenticated feed fetching backend
//!
//! This crate provides:
//! - Username/password login issuing opaque bearer session tokens
//! - Idle-session sweeping via a background task
//! - SSRF-guarded server-side fetching of user-supplied feed URLs
//! - Per-request deadlines and cancellation with graceful shutdown drain
//! - redb embedded database (ACID, MVCC, crash-safe)
//! - REST API

pub mod api;
pub mod config;
pub mod expiration;
pub mod fetch;
pub mod lifecycle;
pub mod storage;
#[cfg(test)]
pub mod testutil;
pub mod tokens;

use config::Config;
use fetch::{ClientError, FeedClient, FetchGuard, Resolver};
use lifecycle::{ShutdownCoordinator, TimeoutGuard};
use storage::Database;
use tokens::SessionStore;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub feed_client: FeedClient,
    pub fetch_guard: FetchGuard,
    pub sessions: SessionStore,
    pub shutdown: ShutdownCoordinator,
    pub timeout_guard: TimeoutGuard,
}

impl AppState {
    pub fn new(config: Config, db: Database, resolver: Resolver) -> Result<Self, ClientError> {
        let feed_client = FeedClient::new(config.fetch.timeout, config.fetch.max_body_bytes)?;
        Ok(Self {
            feed_client,
            fetch_guard: FetchGuard::new(resolver),
            sessions: SessionStore::new(db),
            shutdown: ShutdownCoordinator::new(config.server.shutdown_timeout),
            timeout_guard: TimeoutGuard::new(config.server.request_timeout),
            config,
        })
    }
}
