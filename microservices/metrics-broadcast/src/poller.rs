//! Snapshot poller
//!
//! Polls the aggregation layer on a fixed cadence, atomically replaces the
//! current snapshot, and fans each new snapshot out through the registry.
//! Out-of-band refresh requests trigger an extra poll without disturbing
//! the schedule.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use pulseboard_core::{FeedMessage, ShutdownSignal, Snapshot, TimeWindow};

use crate::aggregate::SnapshotSource;
use crate::registry::SubscriberRegistry;

/// Requests an out-of-band poll. Cheap to clone; handed to every
/// connection task.
#[derive(Clone)]
pub struct RefreshHandle {
    tx: mpsc::Sender<()>,
}

impl RefreshHandle {
    /// Queue a refresh. While one is already pending, further requests
    /// coalesce into it.
    pub fn request(&self) {
        let _ = self.tx.try_send(());
    }
}

pub struct SnapshotPoller {
    source: Arc<dyn SnapshotSource>,
    registry: SubscriberRegistry,
    window: TimeWindow,
    poll_interval: Duration,
    current: RwLock<Option<Arc<Snapshot>>>,
    refresh_tx: mpsc::Sender<()>,
    refresh_rx: Mutex<mpsc::Receiver<()>>,
}

impl SnapshotPoller {
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        registry: SubscriberRegistry,
        window: TimeWindow,
        poll_interval: Duration,
    ) -> Self {
        let (refresh_tx, refresh_rx) = mpsc::channel(1);
        Self {
            source,
            registry,
            window,
            poll_interval,
            current: RwLock::new(None),
            refresh_tx,
            refresh_rx: Mutex::new(refresh_rx),
        }
    }

    /// The most recently completed snapshot, if any tick has succeeded yet.
    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.current.read().clone()
    }

    pub fn refresh_handle(&self) -> RefreshHandle {
        RefreshHandle {
            tx: self.refresh_tx.clone(),
        }
    }

    /// One poll step: fetch, replace the current snapshot, broadcast. The
    /// frame is serialized once per step, not per subscriber. A failed
    /// fetch is logged and skipped; the previous snapshot stays current.
    /// Returns whether a new snapshot was published.
    pub async fn tick_once(&self) -> bool {
        match self.source.fetch(self.window).await {
            Ok(data) => {
                let snapshot = Arc::new(Snapshot::new(data));
                let frame = match serde_json::to_string(&FeedMessage::from_snapshot(&snapshot)) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!("Failed to encode snapshot: {}", e);
                        return false;
                    }
                };

                *self.current.write() = Some(snapshot);
                let delivered = self.registry.broadcast(&frame);
                debug!(delivered, "Snapshot published");
                true
            }
            Err(e) => {
                warn!("Snapshot poll failed, keeping previous snapshot: {}", e);
                false
            }
        }
    }

    /// Poll loop: interval ticks, coalesced refresh requests, shutdown.
    pub async fn run(&self, shutdown: ShutdownSignal) {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut refresh_rx = self.refresh_rx.lock().await;

        info!(
            interval_secs = self.poll_interval.as_secs(),
            window = self.window.as_param(),
            "Snapshot poller running"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick_once().await;
                }
                Some(()) = refresh_rx.recv() => {
                    debug!("Out-of-band refresh requested");
                    self.tick_once().await;
                }
                _ = shutdown.cancelled() => break,
            }
        }

        info!("Snapshot poller stopped");
    }
}
