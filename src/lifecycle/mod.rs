//! Request lifecycle and process shutdown.
//!
//! ```text
//! inbound request ─▶ ShutdownCoordinator::register ─▶ RequestScope (deadline)
//!                 ─▶ TimeoutGuard::run(handler)    ─▶ WorkGuard dropped
//!
//! SIGINT/SIGTERM  ─▶ begin_shutdown: cancel token ─▶ wait for zero (or deadline)
//! ```

pub mod scope;
pub mod shutdown;
pub mod timeout;

pub use scope::{RequestScope, ScopeError, ScopeState};
pub use shutdown::{DrainOutcome, ShutdownCoordinator, ShutdownError, WorkGuard};
pub use timeout::{GuardOutcome, TimeoutGuard};
