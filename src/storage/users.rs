use redb::ReadableTable;

use super::db::{Database, DatabaseError};
use super::models::User;
use super::tables::*;

/// bcrypt hash of the stock `admin` account shipped with the service
pub const DEFAULT_ADMIN_HASH: &str = "$2a$10$X0W3DOiy9dUP0F9xOX5o.uxckTsdpnzMJLiMYqE2kHnRIDYfWDfqC";

impl Database {
    // ========================================================================
    // User operations
    // ========================================================================

    /// Insert or replace a user, keeping the id index in step
    pub fn put_user(&self, user: &User) -> Result<(), DatabaseError> {
        debug_assert!(!user.username.is_empty(), "username must not be empty");

        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(USERS)?;
            let data = rmp_serde::to_vec_named(user)?;
            table.insert(user.username.as_str(), data.as_slice())?;

            let mut id_table = write_txn.open_table(USER_IDS)?;
            id_table.insert(user.id, user.username.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Look a user up by username
    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(USERS)?;

        match table.get(username)? {
            Some(data) => Ok(Some(rmp_serde::from_slice(data.value())?)),
            None => Ok(None),
        }
    }

    /// Seed the stock `admin` account into an empty user table.
    ///
    /// Returns true if the account was inserted.
    pub fn seed_default_user(&self) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;
        let seeded = {
            let mut table = write_txn.open_table(USERS)?;
            if table.first()?.is_some() {
                false
            } else {
                let admin = User {
                    id: 1,
                    username: "admin".to_string(),
                    password_hash: DEFAULT_ADMIN_HASH.to_string(),
                };
                let data = rmp_serde::to_vec_named(&admin)?;
                table.insert(admin.username.as_str(), data.as_slice())?;

                let mut id_table = write_txn.open_table(USER_IDS)?;
                id_table.insert(admin.id, admin.username.as_str())?;
                true
            }
        };
        write_txn.commit()?;

        if seeded {
            tracing::info!("Seeded default admin user");
        }
        Ok(seeded)
    }
}
