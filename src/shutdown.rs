use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Install a shutdown handler for SIGTERM, SIGINT and an optional deadline.
///
/// Returns a `CancellationToken` cancelled by whichever comes first. Failing
/// to register a signal handler is logged and leaves the remaining triggers
/// in place.
pub fn install_shutdown_handler(run_for: Option<Duration>) -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| tracing::warn!(error = %e, "Failed to install SIGTERM handler"))
            .ok();
        let mut sigint = signal(SignalKind::interrupt())
            .map_err(|e| tracing::warn!(error = %e, "Failed to install SIGINT handler"))
            .ok();

        let deadline = async {
            match run_for {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            Some(_) = recv_or_pending(sigterm.as_mut()) => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown");
            }
            Some(_) = recv_or_pending(sigint.as_mut()) => {
                tracing::info!("Received SIGINT, initiating graceful shutdown");
            }
            _ = deadline => {
                tracing::info!(run_for = ?run_for, "Run duration elapsed, shutting down");
            }
            _ = token_clone.cancelled() => {}
        }

        token_clone.cancel();
    });

    token
}

async fn recv_or_pending(signal: Option<&mut tokio::signal::unix::Signal>) -> Option<()> {
    match signal {
        Some(signal) => signal.recv().await,
        None => std::future::pending().await,
    }
}
