use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::lifecycle::ShutdownError;
use crate::AppState;

/// Start the background idle-session sweeper.
///
/// The task registers with the shutdown coordinator like a request does and
/// holds its registration until it exits, so shutdown drains it uniformly.
pub fn start_idle_sweeper(state: Arc<AppState>) -> Result<JoinHandle<()>, ShutdownError> {
    let work = state.shutdown.register()?;
    let period = state.config.sessions.sweep_interval;

    Ok(tokio::spawn(async move {
        let _work = work;
        let token = state.shutdown.token().clone();
        let mut interval_timer = tokio::time::interval(period);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval_timer.tick() => run_sweep(&state).await,
            }
        }

        info!("Idle session sweeper stopped");
    }))
}

async fn run_sweep(state: &AppState) {
    debug!("Running idle session sweep");

    let idle = state.config.sessions.idle_threshold();
    match state.sessions.sweep_idle(state.shutdown.token(), idle).await {
        Ok(count) if count > 0 => debug!(sessions_swept = count, "Idle sessions swept"),
        Ok(_) => {}
        Err(e) => error!(error = %e, "Failed to sweep idle sessions"),
    }
}
