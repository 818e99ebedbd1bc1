//! WebSocket broadcast server
//!
//! Accepts feed subscribers on a dedicated port, sends the current snapshot
//! as a catch-up frame on connect, and relays `request_update` messages to
//! the poller. Delivery to each subscriber runs through its registry outbox
//! so one stalled peer never blocks the rest.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use pulseboard_core::{ClientMessage, FeedMessage, Result, ShutdownSignal};

use crate::poller::SnapshotPoller;
use crate::registry::{SubscriberRegistry, OUTBOX_DEPTH};

/// Upper bound on a single frame write before the peer is dropped.
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct BroadcastServer {
    bind_address: String,
    registry: SubscriberRegistry,
    poller: Arc<SnapshotPoller>,
    running: Arc<AtomicBool>,
}

impl BroadcastServer {
    pub fn new(bind_address: &str, registry: SubscriberRegistry, poller: Arc<SnapshotPoller>) -> Self {
        Self {
            bind_address: bind_address.to_string(),
            registry,
            poller,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self, shutdown: ShutdownSignal) -> Result<()> {
        let listener = TcpListener::bind(&self.bind_address).await?;
        self.serve(listener, shutdown).await;
        Ok(())
    }

    /// Serve subscribers from an already-bound listener.
    pub async fn serve(&self, listener: TcpListener, shutdown: ShutdownSignal) {
        self.running.store(true, Ordering::SeqCst);

        if let Ok(addr) = listener.local_addr() {
            info!(address = %addr, "Broadcast feed listening");
        }

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((socket, addr)) => {
                            let server = self.clone();
                            let conn_shutdown = shutdown.clone();
                            tokio::spawn(async move {
                                server.handle_connection(socket, addr, conn_shutdown).await;
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }

        self.running.store(false, Ordering::SeqCst);
        self.registry.close_all();
        info!("Broadcast feed stopped");
    }

    async fn handle_connection(&self, socket: TcpStream, addr: SocketAddr, shutdown: ShutdownSignal) {
        let ws = match accept_async(socket).await {
            Ok(ws) => ws,
            Err(e) => {
                debug!("Handshake with {} failed: {}", addr, e);
                return;
            }
        };
        let (mut sink, mut stream) = ws.split();

        let (outbox_tx, mut outbox_rx) = mpsc::channel::<String>(OUTBOX_DEPTH);

        // The catch-up frame is queued before registration, so broadcasts
        // that land afterwards stay ordered behind it in the outbox.
        if let Some(snapshot) = self.poller.latest() {
            if let Ok(frame) = serde_json::to_string(&FeedMessage::from_snapshot(&snapshot)) {
                let _ = outbox_tx.try_send(frame);
            }
        }

        let id = self.registry.register(outbox_tx);
        info!(subscriber = %id, peer = %addr, "Subscriber connected");

        let writer = tokio::spawn(async move {
            while let Some(frame) = outbox_rx.recv().await {
                match timeout(SEND_TIMEOUT, sink.send(Message::Text(frame))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        debug!("Frame send failed: {}", e);
                        break;
                    }
                    Err(_) => {
                        warn!("Frame send timed out");
                        break;
                    }
                }
            }
            let _ = sink.close().await;
        });

        let refresh = self.poller.refresh_handle();
        loop {
            tokio::select! {
                msg = stream.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<ClientMessage>(&text) {
                                Ok(ClientMessage::RequestUpdate) => {
                                    debug!(subscriber = %id, "Update requested");
                                    refresh.request();
                                }
                                Err(_) => {
                                    debug!(subscriber = %id, "Ignoring unrecognized message");
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            debug!(subscriber = %id, "Read error: {}", e);
                            break;
                        }
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }

        self.registry.deregister(id);
        // Deregistration drops the outbox sender, so the writer drains and
        // closes the sink on its own.
        let _ = timeout(SEND_TIMEOUT, writer).await;
        debug!(subscriber = %id, "Connection task finished");
    }
}
