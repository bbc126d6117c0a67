//! Cooperative shutdown signalling.
//!
//! One [`ShutdownHandle`] is created at startup and cloned into every task
//! that suspends: the stream read loop, the checkpoint ticker and the HTTP
//! listener. Any clone can trigger it; every clone observes it.

use tokio::sync::watch;

/// What caused the shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Received SIGINT (Ctrl+C).
    SigInt,
    /// Received SIGTERM.
    SigTerm,
    /// Triggered from code (a task failed or its input ended).
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

/// Handle for triggering and awaiting shutdown.
#[derive(Clone)]
pub struct ShutdownHandle {
    sender: watch::Sender<Option<ShutdownSignal>>,
    receiver: watch::Receiver<Option<ShutdownSignal>>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(None);
        Self { sender, receiver }
    }

    /// Trigger a manual shutdown.
    pub fn shutdown(&self) {
        self.trigger(ShutdownSignal::Manual);
    }

    /// Trigger shutdown with a specific cause. The first cause wins.
    pub fn trigger(&self, signal: ShutdownSignal) {
        self.sender.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(signal);
                true
            } else {
                false
            }
        });
    }

    /// Wait until shutdown has been triggered.
    ///
    /// Cancel-safe: usable as a `tokio::select!` branch.
    pub async fn wait(&self) -> ShutdownSignal {
        let mut receiver = self.receiver.clone();
        loop {
            if let Some(signal) = *receiver.borrow_and_update() {
                return signal;
            }
            if receiver.changed().await.is_err() {
                return ShutdownSignal::Manual;
            }
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.receiver.borrow().is_some()
    }
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve when the process receives SIGINT or SIGTERM.
pub async fn os_signal() -> std::io::Result<ShutdownSignal> {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|()| ShutdownSignal::SigInt),
            _ = terminate.recv() => Ok(ShutdownSignal::SigTerm),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok(ShutdownSignal::SigInt)
    }
}
