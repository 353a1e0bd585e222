//! Graceful shutdown coordination.
//!
//! [`ShutdownSignal`] turns SIGINT/SIGTERM (or a programmatic trigger) into a
//! broadcast that the HTTP server and the drain step both observe. Once the
//! server has stopped accepting events, the process waits up to
//! [`ShutdownSignal::timeout`] for in-flight workers; anything still buffered
//! after that is discarded.
//!
//! # Example
//!
//! ```rust,ignore
//! let shutdown = ShutdownSignal::with_timeout(Duration::from_secs(10));
//!
//! let server_shutdown = shutdown.clone();
//! axum::serve(listener, app)
//!     .with_graceful_shutdown(async move { server_shutdown.wait().await })
//!     .await?;
//!
//! dispatcher.wait_idle_timeout(shutdown.timeout()).await;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info};

/// Default drain timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT: u64 = 30;

#[derive(Clone)]
pub struct ShutdownSignal {
    sender: broadcast::Sender<()>,
    triggered: Arc<AtomicBool>,
    timeout: Duration,
}

impl ShutdownSignal {
    /// Create a new shutdown signal with the default timeout (30 seconds).
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            sender,
            triggered: Arc::new(AtomicBool::new(false)),
            timeout,
        }
    }

    /// How long to wait for in-flight workers once shutdown begins.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolve on Ctrl+C, SIGTERM, or [`trigger`](Self::trigger), whichever
    /// comes first, then wake every other waiter.
    pub async fn wait(&self) {
        let mut receiver = self.sender.subscribe();
        if self.is_shutdown() {
            return;
        }

        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
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
                info!("Received Ctrl+C, initiating graceful shutdown...");
            }
            _ = terminate => {
                info!("Received SIGTERM, initiating graceful shutdown...");
            }
            _ = receiver.recv() => {
                return;
            }
        }

        self.notify();
    }

    /// Non-blocking check whether shutdown has begun.
    pub fn is_shutdown(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// Trigger shutdown manually (for tests or programmatic shutdown).
    pub fn trigger(&self) {
        info!("Shutdown triggered programmatically");
        self.notify();
    }

    fn notify(&self) {
        self.triggered.store(true, Ordering::Release);
        let _ = self.sender.send(());
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
