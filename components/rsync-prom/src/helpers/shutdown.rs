// External crates
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Cancels `token` on Ctrl-C, or SIGTERM on unix.
///
/// The token is shared with the launcher, which stops reading rsync's output
/// and kills the child. The exit code guard still pushes whatever code rsync
/// ended up with.
#[instrument(
    name = "rsync_prom_shutdown::listen",
    target = "helpers::shutdown",
    skip_all,
    level = "trace"
)]
pub fn cancel_on_signal(token: CancellationToken) -> JoinHandle<()> {
    tracing::trace!("Installing shutdown signal handlers");
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {
                tracing::trace!("Token cancelled elsewhere, signal listener exiting");
            }
            signal = wait_for_signal() => {
                tracing::warn!(signal, "Shutdown signal received, stopping rsync");
                token.cancel();
            }
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Failed to install SIGTERM handler");
            return ctrl_c().await;
        }
    };

    tokio::select! {
        name = ctrl_c() => name,
        _ = terminate.recv() => "SIGTERM",
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    ctrl_c().await
}

async fn ctrl_c() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        // never resolve: without a handler there is nothing to wait for
        std::future::pending::<()>().await;
    }
    "SIGINT"
}
