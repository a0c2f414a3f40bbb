//! HTTP server lifecycle.
//!
//! bind → spawn the retry worker and the axum server → return a handle with
//! a shutdown channel. Shutting down stops accepting requests, drains
//! in-flight ones, then stops the retry worker.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::api::router::api_router;
use crate::core_state::CoreState;
use crate::pipeline::ingestion::spawn_retry_worker;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Handle to a running server.
pub struct ApiServer {
    pub addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ApiServer {
    /// Ask the server to shut down gracefully. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!("API server shutdown signal sent");
        }
    }

    /// Wait until the server and the retry worker have stopped.
    pub async fn wait(self) {
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "API server task failed");
        }
    }
}

/// Start the server on `addr`. Port 0 picks an ephemeral port; the bound
/// address is in `ApiServer::addr`.
pub async fn start_server_on(core: Arc<CoreState>, addr: SocketAddr) -> Result<ApiServer, ServerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    let addr = listener.local_addr()?;

    let app = api_router(Arc::clone(&core));

    let (worker_tx, worker_rx) = watch::channel(false);
    let worker = spawn_retry_worker(core, worker_rx);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
            tracing::info!("API server received shutdown signal");
        };

        tracing::info!(%addr, "API server started");

        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
        {
            tracing::error!("API server error: {e}");
        }

        let _ = worker_tx.send(true);
        if let Err(e) = worker.await {
            tracing::warn!(error = %e, "Index retry worker did not stop cleanly");
        }

        tracing::info!("API server stopped");
    });

    Ok(ApiServer {
        addr,
        shutdown_tx: Some(shutdown_tx),
        task,
    })
}

/// Serve on `BIND_ADDR` until Ctrl-C.
pub async fn serve(core: Arc<CoreState>) -> Result<(), ServerError> {
    let bind_addr = core.settings.bind_addr;
    let mut server = start_server_on(core, bind_addr).await?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
    }
    server.shutdown();
    server.wait().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    use crate::test_support::offline_core;

    fn localhost() -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, 0))
    }

    #[tokio::test]
    async fn start_serve_and_stop() {
        let (_dir, core) = offline_core();
        let mut server = start_server_on(core, localhost()).await.expect("server should start");
        assert!(server.addr.port() > 0);

        let resp = reqwest::get(format!("http://{}/health", server.addr)).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["services"]["database"], "connected");

        let resp = reqwest::get(format!("http://{}/nonexistent", server.addr)).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);

        server.shutdown();
        server.shutdown(); // Second call is a no-op
        tokio::time::timeout(std::time::Duration::from_secs(5), server.wait())
            .await
            .expect("server should stop");
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let (_dir, core) = offline_core();
        let mut first = start_server_on(Arc::clone(&core), localhost()).await.unwrap();

        match start_server_on(core, first.addr).await {
            Err(ServerError::Bind { addr, .. }) => assert_eq!(addr, first.addr),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("second bind should fail"),
        }
        first.shutdown();
    }
}
