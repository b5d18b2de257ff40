//! Runtime lifecycle: bind the listener, serve, and drain on shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::{routes, AppState};
use crate::common::AppConfig;
use crate::registry::{Registry, RegistrySettings};
use crate::transport::SidecarTransport;

/// Start the bridge and run until ctrl-c, then drain every live
/// transport session before returning.
pub async fn serve(config: AppConfig) -> Result<()> {
    let transport = Arc::new(SidecarTransport::new(&config.sidecar));
    let registry = Arc::new(Registry::new(transport, RegistrySettings::from(&config)));

    let state = AppState {
        registry: registry.clone(),
        api_key: config.api_key.clone(),
    };
    let app = routes::create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.bind, config.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", config.bind, config.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("bridge listening on {}", listener.local_addr()?);

    let root_token = CancellationToken::new();

    // first ctrl-c cancels the root token
    let signal_token = root_token.clone();
    let ctrl_c_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            error!("Failed to listen for Ctrl+C");
            return;
        }
        info!("Ctrl+C received - initiating graceful shutdown");
        signal_token.cancel();
    });

    let shutdown_token = root_token.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown_token.cancelled().await })
        .await
        .context("server error")?;

    ctrl_c_task.abort();
    let _ = ctrl_c_task.await;

    // shutdown barrier: every live session gets asked to terminate
    registry.shutdown().await;
    info!("shutdown complete");
    Ok(())
}
