//! Graceful shutdown.
//!
//! One [`ShutdownHandle`] fans a single signal out to the gRPC server, the
//! HTTP server and the ingestion consumer. Servers stop accepting and drain
//! in-flight requests; the consumer finishes its current batch.

use std::future::Future;

use tokio::sync::watch;

/// What triggered shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Received SIGINT (Ctrl+C)
    SigInt,
    /// Received SIGTERM
    SigTerm,
    /// Manual shutdown requested
    Manual,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SigInt => write!(f, "SIGINT (Ctrl+C)"),
            Self::SigTerm => write!(f, "SIGTERM"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

#[derive(Clone)]
pub struct ShutdownHandle {
    sender: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    pub fn trigger(&self, signal: ShutdownSignal) {
        if !*self.sender.borrow() {
            tracing::info!(%signal, "shutdown requested");
        }
        self.sender.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.sender.borrow()
    }

    /// Receiver for tasks that poll the flag themselves.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }

    /// Future that resolves once shutdown has been triggered.
    pub fn signalled(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut receiver = self.sender.subscribe();
        async move {
            // a closed channel also means shutdown
            let _ = receiver.wait_for(|stop| *stop).await;
        }
    }
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for SIGINT or SIGTERM.
pub async fn shutdown_signal() -> ShutdownSignal {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
        ShutdownSignal::SigInt
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
        ShutdownSignal::SigTerm
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<ShutdownSignal>();

    tokio::select! {
        signal = ctrl_c => signal,
        signal = terminate => signal,
    }
}
