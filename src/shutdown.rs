//! Process signals that end the arbiter.

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Token cancelled on the first SIGINT or SIGTERM.
///
/// `main` stops the control API on it, then stops the game servers.
pub fn shutdown_signal() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        let mut interrupt = match signal(SignalKind::interrupt()) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(error = %e, "Cannot listen for SIGINT");
                return;
            }
        };
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(error = %e, "Cannot listen for SIGTERM");
                return;
            }
        };

        let name = tokio::select! {
            _ = interrupt.recv() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
        };
        tracing::info!(signal = name, "Stopping arbiter");
        trigger.cancel();
    });

    token
}
