//! Conductor teleport service binary.
//!
//! Serves the fragment merge endpoint next to the blob pool.

use std::sync::Arc;

use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use conductor_teleport::{service, ServiceConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("conductor_teleport=info".parse()?),
        )
        .init();

    info!("Conductor teleport service starting");

    let config = match std::env::args().nth(1) {
        Some(path) => ServiceConfig::from_file(path)?,
        None => ServiceConfig::load().unwrap_or_else(|e| {
            info!(error = %e, "failed to load config, using defaults");
            ServiceConfig::default()
        }),
    };

    info!(
        listen = %config.listen,
        storage = %config.storage.storage_type,
        buckets = ?config.buckets,
        "configuration loaded"
    );

    let state = Arc::new(service::AppState {
        buckets: config.buckets()?,
    });
    let app = service::router(state);

    let listener = tokio::net::TcpListener::bind(config.listen).await?;
    info!(addr = %config.listen, "teleport service listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("teleport service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            info!("received SIGTERM, initiating shutdown");
        }
    }
}
