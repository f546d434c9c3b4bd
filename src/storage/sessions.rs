use chrono::{DateTime, Utc};
use redb::ReadableTable;

use super::db::{Database, DatabaseError};
use super::models::Session;
use super::tables::*;

impl Database {
    // ========================================================================
    // Session operations
    // ========================================================================

    /// Store a session. Fails with `UnknownUser` if the owner does not exist.
    pub fn put_session(&self, session: &Session) -> Result<(), DatabaseError> {
        debug_assert!(!session.token.is_empty(), "session token must not be empty");

        let write_txn = self.begin_write()?;
        {
            let id_table = write_txn.open_table(USER_IDS)?;
            if id_table.get(session.user_id)?.is_none() {
                return Err(DatabaseError::UnknownUser(session.user_id));
            }
        }
        {
            let mut table = write_txn.open_table(SESSIONS)?;
            let data = rmp_serde::to_vec_named(session)?;
            table.insert(session.token.as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Get a session by its secret token value
    pub fn get_session(&self, token: &str) -> Result<Option<Session>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(SESSIONS)?;

        match table.get(token)? {
            Some(data) => Ok(Some(rmp_serde::from_slice(data.value())?)),
            None => Ok(None),
        }
    }

    /// Delete a session by its secret token value. Returns false if it was absent.
    pub fn delete_session(&self, token: &str) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;
        let deleted = {
            let mut table = write_txn.open_table(SESSIONS)?;
            let removed = table.remove(token)?.is_some();
            removed
        };
        write_txn.commit()?;
        Ok(deleted)
    }

    /// Move `last_access` forward to `now`. A later stored value is kept.
    ///
    /// Returns false if the session no longer exists.
    pub fn touch_session(&self, token: &str, now: DateTime<Utc>) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;
        let existing = {
            let table = write_txn.open_table(SESSIONS)?;
            let result = match table.get(token)? {
                Some(data) => Some(rmp_serde::from_slice::<Session>(data.value())?),
                None => None,
            };
            result
        };

        let touched = match existing {
            Some(mut session) => {
                if now > session.last_access {
                    session.last_access = now;
                    let serialized = rmp_serde::to_vec_named(&session)?;
                    let mut table = write_txn.open_table(SESSIONS)?;
                    table.insert(token, serialized.as_slice())?;
                }
                true
            }
            None => false,
        };
        write_txn.commit()?;
        Ok(touched)
    }

    /// Tokens of sessions whose `last_access` precedes `cutoff`, read from one snapshot
    pub fn idle_session_tokens(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(SESSIONS)?;

        let mut tokens = Vec::new();
        for entry in table.iter()? {
            let (key, value) = entry?;
            let session: Session = rmp_serde::from_slice(value.value())?;
            if session.last_access < cutoff {
                tokens.push(key.value().to_string());
            }
        }
        Ok(tokens)
    }

    /// Delete one session if it is still idle relative to `cutoff`.
    ///
    /// The idle check is repeated inside the write transaction, so a refresh
    /// that committed after the candidate scan keeps the session alive.
    pub fn delete_session_if_idle(
        &self,
        token: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;
        let still_idle = {
            let table = write_txn.open_table(SESSIONS)?;
            let result = match table.get(token)? {
                Some(data) => rmp_serde::from_slice::<Session>(data.value())?.last_access < cutoff,
                None => false,
            };
            result
        };

        if still_idle {
            let mut table = write_txn.open_table(SESSIONS)?;
            table.remove(token)?;
        }
        write_txn.commit()?;
        Ok(still_idle)
    }

    /// Number of stored sessions
    pub fn session_count(&self) -> Result<usize, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(SESSIONS)?;
        let mut count = 0;
        for entry in table.iter()? {
            entry?;
            count += 1;
        }
        Ok(count)
    }
}
