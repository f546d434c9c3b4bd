use chrono::{Duration, Utc};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::lifecycle::{RequestScope, ScopeError};
use crate::storage::models::Session;
use crate::storage::{Database, DatabaseError, DEFAULT_ADMIN_HASH};

use super::generator::generate_token;
use super::password::{verify_password, Credentials};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Password hash error: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),
    #[error("Blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Scope(#[from] ScopeError),
    #[error("Unauthorized")]
    Unauthorized,
}

/// Credential verification and bearer-session lifecycle.
///
/// Holds no cache: every call reads the store, so a revocation is visible
/// to the very next authentication attempt.
#[derive(Clone)]
pub struct SessionStore {
    db: Database,
}

impl SessionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Verify a username/password pair and return the user's id.
    ///
    /// An unknown username still pays for one bcrypt comparison so that the
    /// response time does not reveal whether the account exists.
    pub async fn authenticate_by_credentials(
        &self,
        scope: &RequestScope,
        credentials: Credentials,
    ) -> Result<u64, SessionError> {
        scope.check()?;
        let Credentials { username, password } = credentials;

        let (user_id, hash) = match self.db.get_user_by_username(&username)? {
            Some(user) => (Some(user.id), user.password_hash),
            None => (None, DEFAULT_ADMIN_HASH.to_string()),
        };

        let matches =
            tokio::task::spawn_blocking(move || verify_password(password, &hash)).await??;

        match (user_id, matches) {
            (Some(id), true) => Ok(id),
            (None, _) => {
                debug!(username = %username, "No such user");
                Err(SessionError::Unauthorized)
            }
            (Some(_), false) => {
                debug!(username = %username, "Password mismatch");
                Err(SessionError::Unauthorized)
            }
        }
    }

    /// Create and persist a fresh session for `user_id`
    pub async fn issue_token(
        &self,
        scope: &RequestScope,
        user_id: u64,
    ) -> Result<String, SessionError> {
        scope.check()?;

        let now = Utc::now();
        let session = Session {
            created_at: now,
            last_access: now,
            token: generate_token(),
            user_id,
        };
        self.db.put_session(&session)?;

        debug!(user_id, "Issued session token");
        Ok(session.token)
    }

    /// Resolve a bearer token to its user id and refresh `last_access`.
    ///
    /// The refresh is best effort: a storage failure there is logged and the
    /// authentication still succeeds. A session that disappears between the
    /// lookup and the refresh (revoked or swept) is `Unauthorized`.
    pub async fn authenticate_by_token(
        &self,
        scope: &RequestScope,
        token: &str,
    ) -> Result<u64, SessionError> {
        scope.check()?;
        let session = self
            .db
            .get_session(token)?
            .ok_or(SessionError::Unauthorized)?;

        scope.check()?;
        match self.db.touch_session(token, Utc::now()) {
            Ok(true) => {}
            Ok(false) => {
                debug!(user_id = session.user_id, "Session vanished during authentication");
                return Err(SessionError::Unauthorized);
            }
            Err(e) => {
                warn!(error = %e, user_id = session.user_id, "Failed to refresh session last access");
            }
        }

        Ok(session.user_id)
    }

    /// Delete a session. Revoking an absent token is not an error.
    pub async fn revoke_token(&self, scope: &RequestScope, token: &str) -> Result<(), SessionError> {
        scope.check()?;
        if self.db.delete_session(token)? {
            debug!("Revoked session token");
        }
        Ok(())
    }

    /// Delete every session idle for longer than `idle`, one row at a time.
    ///
    /// Stops early (returning what was deleted so far) once `cancel` fires.
    pub async fn sweep_idle(
        &self,
        cancel: &CancellationToken,
        idle: Duration,
    ) -> Result<usize, SessionError> {
        let db = self.db.clone();
        let cancel = cancel.clone();
        let cutoff = Utc::now() - idle;

        let deleted = tokio::task::spawn_blocking(move || -> Result<usize, SessionError> {
            let candidates = db.idle_session_tokens(cutoff)?;
            let mut deleted = 0;
            for token in candidates {
                if cancel.is_cancelled() {
                    debug!(deleted, "Idle sweep interrupted by shutdown");
                    break;
                }
                if db.delete_session_if_idle(&token, cutoff)? {
                    deleted += 1;
                }
            }
            Ok(deleted)
        })
        .await??;

        if deleted > 0 {
            info!(count = deleted, "Swept idle sessions");
        }
        Ok(deleted)
    }
}
