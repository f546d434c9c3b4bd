//! Shared test helpers, available to all `#[cfg(test)]` modules in the crate.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tempfile::TempDir;

use crate::config::{Config, FetchConfig, ServerConfig, SessionConfig, StorageConfig};
use crate::fetch::Resolver;
use crate::storage::models::{Session, User};
use crate::storage::Database;
use crate::tokens::password::hash_password;
use crate::tokens::Credentials;
use crate::AppState;

/// Open a fresh database in a temporary directory.
///
/// Returns both the `Database` and the `TempDir` guard. The caller must
/// keep the `TempDir` alive for the duration of the test.
pub fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::open(temp_dir.path(), "morbo").unwrap();
    (db, temp_dir)
}

/// A `Config` with default timeouts and a throwaway data directory
pub fn test_config() -> Config {
    Config {
        fetch: FetchConfig::default(),
        server: ServerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            ..Default::default()
        },
        sessions: SessionConfig::default(),
        storage: StorageConfig {
            data_dir: "/tmp/test".to_string(),
            ..Default::default()
        },
    }
}

/// Build a full `Arc<AppState>` around the given database and config.
///
/// `example.com` resolves statically to a public address; nothing else
/// resolves.
pub fn test_state_with(db: Database, config: Config) -> Arc<AppState> {
    let mut table = HashMap::new();
    table.insert(
        "example.com".to_string(),
        vec!["93.184.216.34".parse().unwrap()],
    );
    Arc::new(AppState::new(config, db, Resolver::Static(table)).unwrap())
}

/// Create a `User` whose password is hashed at the minimum bcrypt cost
pub fn make_user(id: u64, username: &str, password: &str) -> User {
    User {
        id,
        username: username.to_string(),
        password_hash: hash_password(password, 4).unwrap(),
    }
}

/// Create a `Session` for `user_id` last used at `last_access`
pub fn make_session(token: &str, user_id: u64, last_access: DateTime<Utc>) -> Session {
    Session {
        created_at: last_access,
        last_access,
        token: token.to_string(),
        user_id,
    }
}

pub fn credentials(username: &str, password: &str) -> Credentials {
    Credentials {
        username: username.to_string(),
        password: password.to_string(),
    }
}
