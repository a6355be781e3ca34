//! Process-wide shutdown signal
//!
//! A thin wrapper over `tokio::sync::watch` shared by the listener loop, the
//! dispatcher and the HTTP server. Dropping the sender counts as a shutdown.

use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Create a trigger/observer pair. Send `true` on the trigger to shut down.
    pub fn channel() -> (watch::Sender<bool>, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (tx, Shutdown { rx })
    }

    pub fn from_receiver(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once shutdown has been requested (or the trigger was dropped).
    pub async fn triggered(&mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}
