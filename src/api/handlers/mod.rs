mod feed;
mod health;
mod session;

pub use feed::{fetch_feed, FeedRequest};
pub use health::{health, HealthResponse};
pub use session::{create_session, revoke_session, SessionResponse};
