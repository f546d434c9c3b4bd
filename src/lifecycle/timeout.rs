//! Handler-vs-deadline race.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::scope::{RequestScope, ScopeState};

/// How a guarded invocation ended
#[derive(Debug)]
pub enum GuardOutcome<T> {
    Completed(T),
    TimedOut,
    Canceled,
}

/// Runs handlers against a fixed per-request deadline
#[derive(Debug, Clone, Copy)]
pub struct TimeoutGuard {
    timeout: Duration,
}

impl TimeoutGuard {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Open a scope for a new request under the given shutdown token
    pub fn open_scope(&self, shutdown: &CancellationToken) -> RequestScope {
        RequestScope::new(shutdown, self.timeout)
    }

    /// Race `fut` against the scope's deadline.
    ///
    /// If the deadline fires first the future is dropped and its output can
    /// never be observed. Shutdown cancelling the scope first settles it as
    /// `Canceled`; the future keeps running so it can observe the
    /// cancellation, but its result is discarded.
    pub async fn run<F, T>(&self, scope: &RequestScope, fut: F) -> GuardOutcome<T>
    where
        F: Future<Output = T>,
    {
        tokio::pin!(fut);
        let deadline = tokio::time::sleep_until(scope.deadline());
        tokio::pin!(deadline);
        let mut watch_cancel = true;

        loop {
            tokio::select! {
                biased;
                output = &mut fut => {
                    let to = if scope.is_cancelled() {
                        ScopeState::Canceled
                    } else {
                        ScopeState::Completed
                    };
                    return if scope.finish(to) && to == ScopeState::Completed {
                        GuardOutcome::Completed(output)
                    } else {
                        lost(scope)
                    };
                }
                _ = scope.cancelled(), if watch_cancel => {
                    watch_cancel = false;
                    scope.finish(ScopeState::Canceled);
                }
                _ = &mut deadline => {
                    scope.finish(ScopeState::TimedOut);
                    return lost(scope);
                }
            }
        }
    }
}

fn lost<T>(scope: &RequestScope) -> GuardOutcome<T> {
    match scope.state() {
        ScopeState::TimedOut => GuardOutcome::TimedOut,
        _ => GuardOutcome::Canceled,
    }
}
