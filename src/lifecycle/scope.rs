//! Per-request execution context.
//!
//! A `RequestScope` carries the correlation id, the fixed deadline and a
//! cancellation token derived from the process shutdown token. It is passed
//! explicitly to every core call made on behalf of the request, which checks
//! it before each storage access or outbound fetch.
//!
//! ```text
//!            ┌──────────── handler returns ───────────▶ Completed
//!  Active ───┼──────────── deadline fires ────────────▶ TimedOut
//!            └──────────── shutdown cancels ──────────▶ Canceled
//! ```
//!
//! Exactly one terminal transition succeeds; it is decided by a single
//! compare-and-swap on the state word.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    Active,
    Completed,
    TimedOut,
    Canceled,
}

impl ScopeState {
    fn as_u8(self) -> u8 {
        match self {
            ScopeState::Active => 0,
            ScopeState::Completed => 1,
            ScopeState::TimedOut => 2,
            ScopeState::Canceled => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => ScopeState::Completed,
            2 => ScopeState::TimedOut,
            3 => ScopeState::Canceled,
            _ => ScopeState::Active,
        }
    }
}

impl fmt::Display for ScopeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeState::Active => write!(f, "active"),
            ScopeState::Completed => write!(f, "completed"),
            ScopeState::TimedOut => write!(f, "timed_out"),
            ScopeState::Canceled => write!(f, "canceled"),
        }
    }
}

/// Why a scope refused further I/O
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScopeError {
    #[error("the request has been canceled by the server")]
    Canceled,
    #[error("took too long to finish the request")]
    TimedOut,
}

/// Cancellable, deadline-bound context of one request
#[derive(Clone)]
pub struct RequestScope {
    inner: Arc<ScopeInner>,
}

struct ScopeInner {
    cancel: CancellationToken,
    correlation_id: String,
    deadline: Instant,
    state: AtomicU8,
}

impl RequestScope {
    /// Create an `Active` scope whose token is a child of `parent`
    pub fn new(parent: &CancellationToken, timeout: Duration) -> Self {
        Self::with_correlation_id(parent, timeout, new_correlation_id())
    }

    pub fn with_correlation_id(
        parent: &CancellationToken,
        timeout: Duration,
        correlation_id: String,
    ) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                cancel: parent.child_token(),
                correlation_id,
                deadline: Instant::now() + timeout,
                state: AtomicU8::new(ScopeState::Active.as_u8()),
            }),
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.inner.correlation_id
    }

    pub fn deadline(&self) -> Instant {
        self.inner.deadline
    }

    /// Time left before the deadline, zero once it has passed
    pub fn remaining(&self) -> Duration {
        self.inner.deadline.saturating_duration_since(Instant::now())
    }

    pub fn state(&self) -> ScopeState {
        ScopeState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// Whether the shutdown signal (or a timeout) has cancelled this scope
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Resolves once the scope is cancelled
    pub async fn cancelled(&self) {
        self.inner.cancel.cancelled().await
    }

    /// Cheap synchronous check to run before each externally visible I/O step.
    pub fn check(&self) -> Result<(), ScopeError> {
        match self.state() {
            ScopeState::TimedOut => return Err(ScopeError::TimedOut),
            ScopeState::Canceled => return Err(ScopeError::Canceled),
            ScopeState::Active | ScopeState::Completed => {}
        }
        if self.inner.cancel.is_cancelled() {
            return Err(ScopeError::Canceled);
        }
        if Instant::now() >= self.inner.deadline {
            return Err(ScopeError::TimedOut);
        }
        Ok(())
    }

    /// Move `Active -> to`. Returns false if another terminal state won first.
    pub(crate) fn finish(&self, to: ScopeState) -> bool {
        debug_assert_ne!(to, ScopeState::Active);
        let won = self
            .inner
            .state
            .compare_exchange(
                ScopeState::Active.as_u8(),
                to.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if won && to != ScopeState::Completed {
            // Anything the handler spawned observes the loss on its next check
            self.inner.cancel.cancel();
        }
        won
    }
}

impl fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestScope")
            .field("correlation_id", &self.inner.correlation_id)
            .field("state", &self.state())
            .field("remaining", &self.remaining())
            .finish()
    }
}

fn new_correlation_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
