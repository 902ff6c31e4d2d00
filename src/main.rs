//! canvas-rewind - versioned state and rollback for JSON canvas documents
//!
//! Standalone recovery server with a REST API: operation history,
//! compressed snapshots with periodic auto-capture, diff, and rollback
//! under a backup-before-destructive-write guarantee.

use anyhow::Result;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use canvas_rewind::config::ServerConfig;
use canvas_rewind::handlers::{RecoveryManager, build_api_routes, build_public_routes};

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::args().any(|arg| arg == "--env-help") {
        canvas_rewind::config::print_env_help();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env();
    config.log();

    let manager = Arc::new(RecoveryManager::new(config.clone())?);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(build_public_routes(manager.clone()))
        .merge(build_api_routes(manager.clone()))
        .layer(ConcurrencyLimitLayer::new(config.max_concurrent_requests))
        .layer(cors);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Server listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Join auto-capture tasks so no snapshot fires after shutdown.
    manager.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}
