//! User-directed outbound fetches: URL validation, the HTTP primitive and
//! feed metadata extraction.

pub mod client;
pub mod feed;
pub mod guard;

pub use client::{ClientError, FeedClient, FetchResponse};
pub use feed::{parse_feed, FeedError, FeedSummary};
pub use guard::{FetchError, FetchGuard, FetchTarget, Resolver};
