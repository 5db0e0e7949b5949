//! Utility functions and helpers.

use tokio::sync::mpsc::{self, error::TrySendError};

/// Queue a value without waiting, logging a warning if it was dropped.
///
/// Returns whether the value was queued.
pub fn try_send_or_log<T>(tx: &mpsc::Sender<T>, value: T, context: &str) -> bool {
    match tx.try_send(value) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            tracing::warn!("Dropping {}: queue is full", context);
            false
        }
        Err(TrySendError::Closed(_)) => {
            tracing::warn!("Failed to send {}: receiver is gone", context);
            false
        }
    }
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Shutdown requested");
}
