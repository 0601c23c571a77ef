use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

/// Graceful shutdown for the long-running commands (`heartbeat`, `watch`).
///
/// Cleanup steps registered here must not fail the process: errors and
/// timeouts are logged and swallowed.
pub struct ShutdownCoordinator {
    cleanup_timeout: Duration,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            cleanup_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_cleanup_timeout(mut self, cleanup_timeout: Duration) -> Self {
        self.cleanup_timeout = cleanup_timeout;
        self
    }

    /// Resolves on SIGINT (Ctrl-C). If the handler cannot be installed the
    /// future never resolves and the process is left to the default signal
    /// behaviour.
    pub async fn wait_for_signal() {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received interrupt, shutting down"),
            Err(e) => {
                warn!(error = %e, "Failed to install interrupt handler");
                std::future::pending::<()>().await;
            }
        }
    }

    /// Run one cleanup step, bounded by the cleanup timeout.
    pub async fn run_cleanup<F, E>(&self, step: &str, cleanup: F)
    where
        F: Future<Output = Result<(), E>>,
        E: std::fmt::Display,
    {
        match timeout(self.cleanup_timeout, cleanup).await {
            Ok(Ok(())) => info!(step, "Cleanup step finished"),
            Ok(Err(e)) => warn!(step, error = %e, "Cleanup step failed"),
            Err(_) => warn!(step, timeout_secs = self.cleanup_timeout.as_secs(), "Cleanup step timed out"),
        }
    }
}
