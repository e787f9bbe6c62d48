//! HTTP server hosting the messaging API.

use std::net::SocketAddr;

use axum::Router;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::ServerError;

/// Configuration for the API server.
pub struct ApiServerConfig {
    /// Address to bind the server to.
    pub addr: SocketAddr,
}

/// A single HTTP server for the API router.
///
/// `start()` binds the listener and spawns the server task; `shutdown()`
/// stops it gracefully.
pub struct ApiServer {
    config: ApiServerConfig,
    router: Option<Router>,
    local_addr: Option<SocketAddr>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, router: Router) -> Self {
        Self {
            config,
            router: Some(router),
            local_addr: None,
            shutdown_tx: None,
            handle: None,
        }
    }

    /// Address actually bound, once started. Differs from the configured
    /// address when binding port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Bind the listener and spawn the server.
    pub async fn start(&mut self) -> Result<SocketAddr, ServerError> {
        let addr = self.config.addr;
        let startup_failed = |reason: String| ServerError::StartupFailed { addr, reason };

        let app = self
            .router
            .take()
            .ok_or_else(|| startup_failed("server already started".to_string()))?;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| startup_failed(e.to_string()))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| startup_failed(e.to_string()))?;

        tracing::info!("API server listening on {}", local_addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);
        self.local_addr = Some(local_addr);

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                    tracing::info!("API server shutting down");
                })
                .await
            {
                tracing::error!("API server error: {}", e);
            }
        });

        self.handle = Some(handle);
        Ok(local_addr)
    }

    /// Signal graceful shutdown and wait for the server task to finish.
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}
