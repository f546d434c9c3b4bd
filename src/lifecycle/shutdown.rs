//! Process-wide shutdown coordination.
//!
//! Every unit of work (request scope or background task) registers before it
//! starts and holds the returned [`WorkGuard`] until it ends. Dropping the
//! guard deregisters, so the count stays balanced on every exit path,
//! including panics and futures dropped by a timeout.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShutdownError {
    #[error("shutdown in progress, not accepting new work")]
    ShuttingDown,
}

/// Result of draining outstanding work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every registered unit finished
    Drained,
    /// The drain deadline elapsed with units still running
    Abandoned { remaining: usize },
}

/// Cancellation signal plus a count of outstanding units of work.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    cancel: CancellationToken,
    drain_deadline: OnceLock<Instant>,
    drain_timeout: Duration,
    outstanding: AtomicUsize,
    zero: Notify,
}

impl ShutdownCoordinator {
    pub fn new(drain_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                cancel: CancellationToken::new(),
                drain_deadline: OnceLock::new(),
                drain_timeout,
                outstanding: AtomicUsize::new(0),
                zero: Notify::new(),
            }),
        }
    }

    /// Register one unit of work.
    ///
    /// Fails once `begin_shutdown` has been called. The increment happens
    /// before the cancellation check, so a unit is either visible to the
    /// drain or rejected, never both missed.
    pub fn register(&self) -> Result<WorkGuard, ShutdownError> {
        self.inner.outstanding.fetch_add(1, Ordering::SeqCst);
        let guard = WorkGuard {
            inner: Arc::clone(&self.inner),
        };
        if self.inner.cancel.is_cancelled() {
            drop(guard);
            return Err(ShutdownError::ShuttingDown);
        }
        Ok(guard)
    }

    /// The process-wide cancellation token. Scopes derive child tokens from it.
    pub fn token(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::SeqCst)
    }

    /// Signal cancellation, then wait for outstanding work to reach zero or
    /// for the drain deadline, whichever comes first. Units still running at
    /// the deadline are abandoned.
    pub async fn begin_shutdown(&self) -> DrainOutcome {
        info!(
            outstanding = self.outstanding(),
            timeout_secs = self.inner.drain_timeout.as_secs_f64(),
            "Shutdown initiated, draining outstanding work"
        );
        let deadline = *self
            .inner
            .drain_deadline
            .get_or_init(|| Instant::now() + self.inner.drain_timeout);
        self.inner.cancel.cancel();

        match tokio::time::timeout_at(deadline, self.wait_for_zero()).await {
            Ok(()) => {
                info!("All outstanding work drained");
                DrainOutcome::Drained
            }
            Err(_) => {
                let remaining = self.outstanding();
                warn!(remaining, "Drain deadline elapsed, abandoning remaining work");
                DrainOutcome::Abandoned { remaining }
            }
        }
    }

    /// Run `fut` until it finishes or the drain deadline set by
    /// `begin_shutdown` passes, whichever comes first. Before shutdown there
    /// is no deadline.
    pub async fn within_drain_deadline<F>(&self, fut: F) -> Option<F::Output>
    where
        F: Future,
    {
        match self.inner.drain_deadline.get() {
            Some(deadline) => tokio::time::timeout_at(*deadline, fut).await.ok(),
            None => Some(fut.await),
        }
    }

    async fn wait_for_zero(&self) {
        loop {
            let notified = self.inner.zero.notified();
            tokio::pin!(notified);
            // Register interest before reading the count so a wakeup between
            // the load and the await is not lost.
            notified.as_mut().enable();
            if self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Registration of one unit of work; deregisters on drop.
pub struct WorkGuard {
    inner: Arc<Inner>,
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        if self.inner.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.zero.notify_waiters();
        }
    }
}
