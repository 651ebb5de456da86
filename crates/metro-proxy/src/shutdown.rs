//! Process termination signals.

/// Resolves when the process receives SIGINT or SIGTERM (Ctrl-C only on
/// non-Unix platforms). Returns the name of the signal.
///
/// If the handlers cannot be installed the error is logged and the future
/// never resolves; the proxy keeps serving and can still be killed.
pub async fn shutdown_signal() -> &'static str {
    match wait_for_signal().await {
        Ok(name) => name,
        Err(e) => {
            tracing::error!(error = %e, "failed to install signal handlers");
            std::future::pending().await
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = interrupt.recv() => Ok("SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
