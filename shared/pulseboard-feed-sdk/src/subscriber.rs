//! Reconnecting feed subscriber
//!
//! One background task owns the connection lifecycle: connect, read frames,
//! and on any disconnect retry after a fixed delay until shut down. Exactly
//! one attempt is in flight at a time.

use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use pulseboard_core::{ClientMessage, FeedMessage, ShutdownSignal, Snapshot};

use crate::error::{FeedError, Result};

/// Pending refresh requests per connection.
const COMMAND_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Connecting,
    Connected,
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub url: String,
    pub retry_delay: Duration,
}

impl FeedConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            retry_delay: Duration::from_secs(3),
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }
}

type CommandSlot = Arc<RwLock<Option<mpsc::Sender<String>>>>;
type SnapshotCell = Arc<RwLock<Option<Arc<Snapshot>>>>;

pub struct FeedSubscriber {
    state_rx: watch::Receiver<FeedState>,
    latest: SnapshotCell,
    command_tx: CommandSlot,
    shutdown: ShutdownSignal,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl FeedSubscriber {
    /// Validate the URL and spawn the background connection task.
    pub fn spawn(config: FeedConfig) -> Result<Self> {
        config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| FeedError::InvalidUrl(e.to_string()))?;

        let (state_tx, state_rx) = watch::channel(FeedState::Connecting);
        let latest: SnapshotCell = Arc::new(RwLock::new(None));
        let command_tx: CommandSlot = Arc::new(RwLock::new(None));
        let shutdown = ShutdownSignal::new();

        let task_latest = latest.clone();
        let task_commands = command_tx.clone();
        let task_shutdown = shutdown.clone();
        let handle = tokio::spawn(async move {
            feed_loop(config, state_tx, task_latest, task_commands, task_shutdown).await;
        });

        Ok(Self {
            state_rx,
            latest,
            command_tx,
            shutdown,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn state(&self) -> FeedState {
        *self.state_rx.borrow()
    }

    /// Watch receiver for state transitions.
    pub fn state_changes(&self) -> watch::Receiver<FeedState> {
        self.state_rx.clone()
    }

    /// The last snapshot received, kept across disconnects.
    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.latest.read().clone()
    }

    /// Ask the server for an immediate update. Returns whether the request
    /// was handed to a live connection; nothing is queued while
    /// disconnected. The server refreshes every subscriber, so updates can
    /// also arrive unrequested.
    pub fn request_refresh(&self) -> bool {
        let Ok(payload) = serde_json::to_string(&ClientMessage::RequestUpdate) else {
            return false;
        };
        match self.command_tx.read().as_ref() {
            Some(tx) => tx.try_send(payload).is_ok(),
            None => false,
        }
    }

    /// Stop reconnecting, close any live connection, and join the task.
    pub async fn shutdown(&self) {
        self.shutdown.trigger();
        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

async fn feed_loop(
    config: FeedConfig,
    state_tx: watch::Sender<FeedState>,
    latest: SnapshotCell,
    command_tx: CommandSlot,
    shutdown: ShutdownSignal,
) {
    loop {
        if shutdown.is_triggered() {
            break;
        }

        let _ = state_tx.send(FeedState::Connecting);
        match connect_async(config.url.as_str()).await {
            Ok((ws, _)) => {
                info!(url = %config.url, "Feed connected");

                let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_DEPTH);
                *command_tx.write() = Some(cmd_tx);
                let _ = state_tx.send(FeedState::Connected);

                run_connection(ws, cmd_rx, &latest, &shutdown).await;

                *command_tx.write() = None;
                let _ = state_tx.send(FeedState::Disconnected);
                debug!(url = %config.url, "Feed disconnected");
            }
            Err(e) => {
                debug!(url = %config.url, "Feed connect failed: {}", e);
                let _ = state_tx.send(FeedState::Disconnected);
            }
        }

        if shutdown.is_triggered() {
            break;
        }

        // Fixed retry delay; shutdown cancels the wait
        tokio::select! {
            _ = tokio::time::sleep(config.retry_delay) => {}
            _ = shutdown.cancelled() => break,
        }
    }
}

async fn run_connection(
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut cmd_rx: mpsc::Receiver<String>,
    latest: &SnapshotCell,
    shutdown: &ShutdownSignal,
) {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<FeedMessage>(&text) {
                            Ok(FeedMessage::MetricsUpdate { timestamp, data }) => {
                                let snapshot = Arc::new(Snapshot {
                                    generated_at: timestamp,
                                    data,
                                });
                                *latest.write() = Some(snapshot);
                            }
                            Err(_) => {
                                debug!("Ignoring unrecognized frame");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("Feed read error: {}", e);
                        break;
                    }
                }
            }
            Some(payload) = cmd_rx.recv() => {
                if sink.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
            _ = shutdown.cancelled() => {
                let _ = sink.close().await;
                break;
            }
        }
    }
}
