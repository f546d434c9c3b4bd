use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use morbo::fetch::Resolver;
use morbo::lifecycle::DrainOutcome;
use morbo::{api, config::Config, expiration, storage::Database, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    match log_format.to_lowercase().as_str() {
        "gcp" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_stackdriver::layer())
                .init();
        }
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_current_span(true)
                        .with_span_list(false),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    info!(version = env!("CARGO_PKG_VERSION"), "morbo starting");

    // Load configuration
    let config = Config::load()?;

    // Initialize database
    let db = Database::open(&config.storage.data_dir, &config.storage.db_name)?;
    info!(
        data_dir = %config.storage.data_dir,
        db_name = %config.storage.db_name,
        "Database opened"
    );
    if config.storage.seed_admin && db.seed_default_user()? {
        warn!("Seeded default admin account; change its password");
    }

    // Create shared state
    let state = Arc::new(AppState::new(config.clone(), db, Resolver::System)?);

    // Start background tasks
    let sweeper_handle = expiration::start_idle_sweeper(Arc::clone(&state))?;

    // Build and start the HTTP server
    let app = api::create_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    info!("Listening on: {}", config.server.bind_address);

    let stop_accepting = state.shutdown.token().clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { stop_accepting.cancelled().await })
            .await
    });

    tokio::select! {
        _ = shutdown_signal() => {}
        result = &mut server => {
            // The server only returns on its own when it failed
            result??;
            anyhow::bail!("HTTP server exited unexpectedly");
        }
    }

    match state.shutdown.begin_shutdown().await {
        DrainOutcome::Drained => {
            if let Err(e) = sweeper_handle.await {
                error!(error = %e, "Idle session sweeper panicked");
            }
            // Connections outside any scope (e.g. stalled mid-headers) hold no
            // registration; they get only what is left of the drain budget
            match state.shutdown.within_drain_deadline(&mut server).await {
                Some(Ok(Ok(()))) => {}
                Some(Ok(Err(e))) => error!(error = %e, "HTTP server error during shutdown"),
                Some(Err(e)) => error!(error = %e, "HTTP server task failed"),
                None => {
                    warn!("Open connections outlived the drain deadline, closing them");
                    server.abort();
                }
            }
        }
        DrainOutcome::Abandoned { remaining } => {
            warn!(remaining, "Exiting with work still in flight");
            sweeper_handle.abort();
            server.abort();
        }
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining in-flight work");
}
