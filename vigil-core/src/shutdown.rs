//! Process-wide cooperative shutdown.
//!
//! One `CancellationToken` fans out to every long-lived task in the process.
//! SIGINT, SIGTERM, and SIGQUIT all trip the same token.

use tokio_util::sync::CancellationToken;

/// Install the signal listener and return the shared token.
///
/// # Panics
/// Panics if the signal handlers cannot be registered; there is no useful
/// way to run without them.
pub fn install() -> CancellationToken {
    let token = CancellationToken::new();
    let armed = token.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("shutdown signal received");
        armed.cancel();
    });
    token
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt =
        signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut terminate =
        signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut quit = signal(SignalKind::quit()).expect("failed to install SIGQUIT handler");

    tokio::select! {
        _ = interrupt.recv() => {}
        _ = terminate.recv() => {}
        _ = quit.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
