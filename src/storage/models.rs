use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user account. Read-only to the session layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub username: String,
    /// bcrypt hash (`$2a$`/`$2b$` modular crypt format)
    pub password_hash: String,
}

/// A bearer session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// When the session was issued
    pub created_at: DateTime<Utc>,
    /// Last successful token authentication; never moves backwards
    pub last_access: DateTime<Utc>,
    /// Opaque secret token (40 random bytes, base64url), primary key
    pub token: String,
    /// Owner of the session, references `User::id`
    pub user_id: u64,
}
