use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Install a shutdown handler that listens for SIGTERM and SIGINT.
///
/// Returns a `CancellationToken` that is cancelled when either signal is received.
/// The node stops its election loop and RPC server when the token fires.
pub fn install_shutdown_handler() -> Result<CancellationToken> {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, shutting down");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT, shutting down");
            }
            // Cancelled from elsewhere, e.g. a simulated crash
            _ = token_clone.cancelled() => return,
        }

        token_clone.cancel();
    });

    Ok(token)
}
