//! Graceful Shutdown Module
//!
//! Tracks background tasks in a JoinSet and cancels them once the server has
//! stopped serving.

use std::future::Future;
use std::time::Duration;

use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Shutdown coordinator for graceful termination
pub struct ShutdownCoordinator {
    shutdown_tx: broadcast::Sender<()>,
    tasks: JoinSet<()>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            shutdown_tx,
            tasks: JoinSet::new(),
        }
    }

    /// Gets a shutdown receiver
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            receiver: self.shutdown_tx.subscribe(),
        }
    }

    /// Spawns a background task that is cancelled on shutdown
    pub fn spawn<F>(&mut self, name: &'static str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let shutdown = self.subscribe();

        self.tasks.spawn(async move {
            tokio::select! {
                _ = future => {
                    info!(task = name, "Background task completed");
                }
                _ = shutdown.recv() => {
                    info!(task = name, "Background task cancelled by shutdown");
                }
            }
        });
    }

    /// Signals every task and waits up to `timeout` for them to finish.
    pub async fn shutdown(mut self, timeout: Duration) {
        info!("Initiating graceful shutdown");

        let _ = self.shutdown_tx.send(());

        let drained = tokio::time::timeout(timeout, async {
            while let Some(result) = self.tasks.join_next().await {
                if let Err(e) = result {
                    warn!(error = %e, "Task failed during shutdown");
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!("Shutdown timeout reached, aborting remaining tasks");
            self.tasks.abort_all();
        }

        info!("Shutdown complete");
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Shutdown signal receiver
pub struct ShutdownSignal {
    receiver: broadcast::Receiver<()>,
}

impl ShutdownSignal {
    /// Waits for the shutdown signal
    pub async fn recv(mut self) {
        let _ = self.receiver.recv().await;
    }
}

/// Resolves on SIGINT or SIGTERM.
///
/// A handler that cannot be installed is logged and never fires.
pub async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
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
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}

/// Drives `server_future` to completion, then shuts the coordinator down.
///
/// The server future is expected to stop on its own when a signal arrives
/// (for example through `serve_with_shutdown`).
pub async fn run_with_graceful_shutdown<F, E>(
    server_future: F,
    shutdown_coordinator: ShutdownCoordinator,
    shutdown_timeout: Duration,
) -> Result<(), E>
where
    F: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    let result = server_future.await;
    match &result {
        Ok(()) => info!("Server stopped"),
        Err(e) => error!(error = %e, "Server error"),
    }

    shutdown_coordinator.shutdown(shutdown_timeout).await;
    result
}
