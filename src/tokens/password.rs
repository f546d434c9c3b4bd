//! Password hashing and verification (bcrypt).

use std::fmt;

use serde::Deserialize;

/// Login input. The password is redacted from `Debug` output and is consumed
/// by the single comparison that needs it.
#[derive(Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Hash a password with the given bcrypt cost
pub fn hash_password(password: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, cost)
}

/// Constant-time comparison of `password` against a stored bcrypt hash.
///
/// Takes the password by value so the plaintext is dropped when the
/// comparison returns.
pub fn verify_password(password: String, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    bcrypt::verify(password, hash)
}
