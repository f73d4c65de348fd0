//! HTTP server lifecycle.

use crate::{routes::create_router, shutdown::shutdown_signal, state::AppState};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

/// Server startup or runtime failure
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Could not bind the listen address
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address
        addr: String,
        /// Cause
        #[source]
        source: std::io::Error,
    },
    /// The accept loop failed
    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Gateway HTTP server
#[derive(Debug)]
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a server for the given state
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Bind the configured address and serve until Ctrl+C or SIGTERM
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(async {
            shutdown_signal().await;
        })
        .await
    }

    /// Serve until `signal` resolves, then drain in-flight requests for at
    /// most the configured shutdown timeout
    pub async fn run_with_shutdown<F>(self, signal: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let server_config = &self.state.config.server;
        let addr = format!("{}:{}", server_config.host, server_config.port);
        let drain_timeout = server_config.shutdown_timeout;

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        info!(addr = %addr, "Gateway listening");

        let (tx, mut rx) = watch::channel(false);
        let graceful = async move {
            signal.await;
            let _ = tx.send(true);
        };

        let app = create_router(self.state).into_make_service_with_connect_info::<SocketAddr>();
        let serve = async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(graceful)
                .await
        };

        let deadline = async move {
            if rx.wait_for(|stopping| *stopping).await.is_err() {
                std::future::pending::<()>().await;
            }
            tokio::time::sleep(drain_timeout).await;
        };

        tokio::select! {
            result = serve => result?,
            () = deadline => {
                warn!(timeout = ?drain_timeout, "Shutdown timeout elapsed, dropping open connections");
            }
        }

        info!("Gateway stopped");
        Ok(())
    }
}
