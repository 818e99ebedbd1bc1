//! Connection registry: subscriber identities and broadcast fan-out

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Per-subscriber outbox depth. A peer that falls this many frames behind
/// misses broadcast rounds instead of stalling everyone else.
pub const OUTBOX_DEPTH: usize = 16;

/// One registered feed connection. The outbox carries prepared JSON frames;
/// the connection's writer task drains it onto the socket.
pub struct Subscriber {
    pub id: Uuid,
    pub connected_at: DateTime<Utc>,
    outbox: mpsc::Sender<String>,
}

#[derive(Default)]
struct RegistryCounters {
    registered_total: AtomicU64,
    broadcasts: AtomicU64,
    frames_delivered: AtomicU64,
    frames_dropped: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub active: usize,
    pub registered_total: u64,
    pub broadcasts: u64,
    pub frames_delivered: u64,
    pub frames_dropped: u64,
}

/// Tracks who is connected right now. Registration hands out a fresh
/// identity every time; a reconnecting peer is a new subscriber.
#[derive(Clone)]
pub struct SubscriberRegistry {
    subscribers: Arc<DashMap<Uuid, Subscriber>>,
    counters: Arc<RegistryCounters>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(DashMap::new()),
            counters: Arc::new(RegistryCounters::default()),
        }
    }

    pub fn register(&self, outbox: mpsc::Sender<String>) -> Uuid {
        let id = Uuid::new_v4();
        self.subscribers.insert(
            id,
            Subscriber {
                id,
                connected_at: Utc::now(),
                outbox,
            },
        );
        self.counters.registered_total.fetch_add(1, Ordering::Relaxed);
        id
    }

    /// Remove a subscriber. A no-op for unknown ids, so disconnect paths
    /// can call it without coordinating.
    pub fn deregister(&self, id: Uuid) {
        if let Some((_, subscriber)) = self.subscribers.remove(&id) {
            let connected_secs = (Utc::now() - subscriber.connected_at).num_seconds();
            debug!(subscriber_id = %id, connected_secs, "Subscriber deregistered");
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Deliver a prepared frame to every subscriber registered at the start
    /// of the call. A full outbox skips that subscriber for this round; a
    /// closed outbox deregisters it. Neither interrupts delivery to the
    /// rest. Returns the number of outboxes the frame reached.
    pub fn broadcast(&self, frame: &str) -> usize {
        // Membership is captured up front; sends never run under map locks
        let members: Vec<(Uuid, mpsc::Sender<String>)> = self
            .subscribers
            .iter()
            .map(|entry| (entry.id, entry.outbox.clone()))
            .collect();

        let mut delivered = 0u64;
        for (id, outbox) in members {
            match outbox.try_send(frame.to_string()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.counters.frames_dropped.fetch_add(1, Ordering::Relaxed);
                    debug!(subscriber_id = %id, "Outbox full, skipping this round");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    warn!(subscriber_id = %id, "Outbox closed, deregistering subscriber");
                    self.deregister(id);
                }
            }
        }

        self.counters.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.counters.frames_delivered.fetch_add(delivered, Ordering::Relaxed);
        delivered as usize
    }

    /// Drop every subscriber. Closing the outboxes ends the writer tasks,
    /// which close their sockets.
    pub fn close_all(&self) {
        let active = self.subscribers.len();
        self.subscribers.clear();
        debug!(closed = active, "All subscribers closed");
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            active: self.subscribers.len(),
            registered_total: self.counters.registered_total.load(Ordering::Relaxed),
            broadcasts: self.counters.broadcasts.load(Ordering::Relaxed),
            frames_delivered: self.counters.frames_delivered.load(Ordering::Relaxed),
            frames_dropped: self.counters.frames_dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}
