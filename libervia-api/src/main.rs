//! Libervia Gateway Entry Point
//!
//! Boot order: logging, peppers (fatal when the auth pepper is missing or
//! short), configuration, state, router, serve. On SIGINT/SIGTERM the
//! server stops accepting connections, drains in-flight requests, shuts
//! every core instance down, and flushes the registry's background writer.

use std::net::SocketAddr;

use libervia_api::{build_state, create_gateway_router, ApiConfig, ApiError, BootOptions};
use libervia_backup::BackupPepper;
use libervia_tenancy::AuthPepper;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    let config = ApiConfig::from_env();
    init_tracing(&config);

    // The process must refuse to start without a valid auth pepper
    let auth_pepper = AuthPepper::from_env().map_err(|e| {
        tracing::error!(error = %e, "refusing to boot: LIBERVIA_AUTH_PEPPER invalid");
        ApiError::internal(e.to_string())
    })?;
    let backup_pepper = BackupPepper::from_env().ok();

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| ApiError::internal(format!("Invalid bind address: {}", e)))?;

    let state = build_state(BootOptions {
        config,
        auth_pepper,
        backup_pepper,
    })
    .await?;
    let registry = state.registry.clone();
    let runtime = state.runtime.clone();
    let app = create_gateway_router(state);

    tracing::info!(%addr, "Starting Libervia gateway");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::internal(format!("Server error: {}", e)))?;

    tracing::info!("Draining tenant instances");
    runtime.shutdown_all().await;
    registry.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

fn init_tracing(config: &ApiConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            tracing::error!("failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
