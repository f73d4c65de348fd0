//! Shutdown signal handling.

use tokio::signal;
use tracing::{error, info};

/// Resolves on Ctrl+C or SIGTERM and returns which one arrived
pub async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        "ctrl+c"
    };

    #[cfg(unix)]
    let sigterm = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
        "sigterm"
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<&'static str>();

    let reason = tokio::select! {
        reason = ctrl_c => reason,
        reason = sigterm => reason,
    };
    info!(signal = reason, "Shutdown signal received");
    reason
}
