pub mod generator;
pub mod password;
pub mod session;

pub use generator::generate_token;
pub use password::Credentials;
pub use session::{SessionError, SessionStore};
