use std::future::Future;

use tokio_util::sync::CancellationToken;

/// Cancel the returned token on Ctrl-C, or SIGTERM on unix.
///
/// The coordinator cycles and the API server all watch this token.
pub fn install_shutdown_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();

    tokio::spawn(async move {
        tokio::select! {
            _ = interrupt(tokio::signal::ctrl_c()) => tracing::info!("Received interrupt, shutting down"),
            _ = terminate() => tracing::info!("Received SIGTERM, shutting down"),
        }
        cancel.cancel();
    });

    token
}

/// Resolves on Ctrl-C. A handler that failed to install never resolves, so
/// SIGTERM still works.
async fn interrupt(signal: impl Future<Output = std::io::Result<()>>) {
    if let Err(e) = signal.await {
        tracing::error!(error = %e, "Interrupt handler unavailable");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::warn!(error = %e, "SIGTERM handler unavailable");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
