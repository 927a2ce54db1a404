//! Graceful shutdown handling for SIGTERM and SIGINT.
//!
//! On a signal the shared token is cancelled: the HTTP server stops
//! accepting connections and the update loop stops starting new entries,
//! letting in-flight downloads finish their temp-then-rename step.

use std::future::Future;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Shutdown coordinator
#[derive(Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token cancelled when shutdown starts.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Start shutdown without a signal.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Wait for SIGTERM or SIGINT, then cancel the token. Returns early if
    /// shutdown was triggered some other way.
    pub async fn wait_for_signal(&self) {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                warn!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
            }
            _ = terminate => {
                info!("Received SIGTERM, initiating graceful shutdown...");
            }
            _ = self.token.cancelled() => {}
        }

        self.token.cancel();
    }

    /// Wait for a signal while watching `task`. If the task finishes first,
    /// shutdown is triggered and its output returned.
    pub async fn wait_for_signal_or<F>(&self, task: F) -> Option<F::Output>
    where
        F: Future,
    {
        tokio::select! {
            _ = self.wait_for_signal() => None,
            output = task => {
                warn!("Task exited before shutdown was requested, shutting down");
                self.token.cancel();
                Some(output)
            }
        }
    }

    /// Wait for a task to wind down, giving up after `grace`.
    pub async fn drain<F, T>(&self, name: &str, task: F, grace: Duration) -> Option<T>
    where
        F: Future<Output = T>,
    {
        match tokio::time::timeout(grace, task).await {
            Ok(output) => Some(output),
            Err(_) => {
                warn!("{} did not stop within {:?}, forcing exit", name, grace);
                None
            }
        }
    }
}
