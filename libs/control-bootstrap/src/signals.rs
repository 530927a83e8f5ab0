use std::sync::Arc;

use anyhow::Result;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Wait for Ctrl+C or SIGTERM.
///
/// # Errors
/// Returns an error if a signal handler cannot be installed.
pub async fn wait_for_shutdown() -> Result<()> {
    tokio::select! {
        result = wait_ctrl_c() => result?,
        result = wait_sigterm() => result?,
    }
    tracing::info!("Shutdown signal received, initiating graceful shutdown");
    Ok(())
}

async fn wait_ctrl_c() -> Result<()> {
    signal::ctrl_c().await.map_err(|e| {
        tracing::error!(%e, "Error handling Ctrl+C signal");
        e
    })?;
    tracing::info!("Received Ctrl+C signal");
    Ok(())
}

#[cfg(unix)]
async fn wait_sigterm() -> Result<()> {
    let mut handler = signal::unix::signal(signal::unix::SignalKind::terminate()).map_err(|e| {
        tracing::error!(%e, "Failed to install SIGTERM handler");
        e
    })?;
    handler.recv().await;
    tracing::info!("Received SIGTERM signal");
    Ok(())
}

#[cfg(not(unix))]
async fn wait_sigterm() -> Result<()> {
    std::future::pending::<Result<()>>().await
}

/// SIGHUP listener. The handler is registered by [`ReloadSignal::install`],
/// so signals that arrive before [`ReloadSignal::spawn`] are queued rather
/// than terminating the process.
pub struct ReloadSignal {
    #[cfg(unix)]
    hangup: signal::unix::Signal,
}

impl ReloadSignal {
    /// Register the SIGHUP handler. Must be called inside a Tokio runtime.
    ///
    /// # Errors
    /// Returns an error if the SIGHUP handler cannot be installed.
    #[cfg(unix)]
    pub fn install() -> Result<Self> {
        let hangup = signal::unix::signal(signal::unix::SignalKind::hangup()).map_err(|e| {
            tracing::error!(%e, "Failed to install SIGHUP handler");
            e
        })?;
        Ok(Self { hangup })
    }

    /// # Errors
    /// Never fails on this platform.
    #[cfg(not(unix))]
    #[allow(clippy::unnecessary_wraps)]
    pub fn install() -> Result<Self> {
        Ok(Self {})
    }

    /// Run `on_reload` on the blocking pool for every SIGHUP until `cancel`
    /// fires. Reloads never overlap.
    #[must_use]
    pub fn spawn<F>(self, cancel: CancellationToken, on_reload: F) -> tokio::task::JoinHandle<()>
    where
        F: Fn() + Send + Sync + 'static,
    {
        tokio::spawn(self.run(cancel, Arc::new(on_reload)))
    }

    #[cfg(unix)]
    async fn run<F>(mut self, cancel: CancellationToken, on_reload: Arc<F>)
    where
        F: Fn() + Send + Sync + 'static,
    {
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                received = self.hangup.recv() => {
                    if received.is_none() {
                        return;
                    }
                    tracing::info!("Received SIGHUP, reloading");
                    let reload = on_reload.clone();
                    if let Err(e) = tokio::task::spawn_blocking(move || reload()).await {
                        tracing::error!(error = %e, "Reload task failed");
                    }
                }
            }
        }
    }

    #[cfg(not(unix))]
    async fn run<F>(self, cancel: CancellationToken, _on_reload: Arc<F>)
    where
        F: Fn() + Send + Sync + 'static,
    {
        cancel.cancelled().await;
    }
}

/// Cancel `token` once a shutdown signal arrives.
#[must_use]
pub fn cancel_on_shutdown(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown().await {
            tracing::error!(error = %e, "Signal handling failed, shutting down");
        }
        token.cancel();
    })
}
