//! Cooperative shutdown signal shared across service tasks

use std::sync::Arc;
use tokio::sync::watch;

/// Clonable shutdown flag. Every long-lived loop (poller, accept loop,
/// connection tasks, SDK reconnect loop) holds a clone and selects on
/// `cancelled()`. Triggering is idempotent and fans out to all clones.
#[derive(Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    /// Flip the flag. All pending and future `cancelled()` calls resolve.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal has been triggered.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                // Sender gone counts as shutdown
                return;
            }
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
