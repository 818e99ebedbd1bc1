//! End-to-end feed tests: poller, registry, and WebSocket server wired
//! together over ephemeral ports, with a scripted source standing in for
//! the store.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use metrics_broadcast::aggregate::{AggregateError, Result as SourceResult, SnapshotSource};
use metrics_broadcast::poller::SnapshotPoller;
use metrics_broadcast::registry::SubscriberRegistry;
use metrics_broadcast::server::BroadcastServer;
use pulseboard_core::{
    CategorySummary, FeedMessage, ShutdownSignal, SnapshotData, TimeWindow,
};
use pulseboard_feed_sdk::{FeedConfig, FeedState, FeedSubscriber};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Counts fetches; each successful fetch carries its ordinal in the
/// summary `count` field so frames are tellable apart.
struct ScriptedSource {
    revision: AtomicU64,
    fail: AtomicBool,
}

impl ScriptedSource {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            revision: AtomicU64::new(0),
            fail: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl SnapshotSource for ScriptedSource {
    async fn fetch(&self, _window: TimeWindow) -> SourceResult<SnapshotData> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AggregateError::Source("injected failure".to_string()));
        }
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SnapshotData {
            metrics: vec![CategorySummary {
                category: "revenue".to_string(),
                count: revision,
                avg: 100.0,
                sum: 100.0 * revision as f64,
                max: 100.0,
                min: 100.0,
                latest_timestamp: chrono::Utc::now(),
            }],
            time_series: vec![],
        })
    }
}

struct Feed {
    url: String,
    poller: Arc<SnapshotPoller>,
    registry: SubscriberRegistry,
    shutdown: ShutdownSignal,
}

/// Bind an ephemeral port and serve the feed from it. The poller loop is
/// not started; tests drive ticks directly or spawn the loop themselves.
async fn start_feed(poll_interval: Duration) -> Feed {
    let source = ScriptedSource::new();
    let registry = SubscriberRegistry::new();
    let poller = Arc::new(SnapshotPoller::new(
        source,
        registry.clone(),
        TimeWindow::Last24Hours,
        poll_interval,
    ));
    let shutdown = ShutdownSignal::new();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = BroadcastServer::new(&addr.to_string(), registry.clone(), poller.clone());

    let serve_shutdown = shutdown.clone();
    tokio::spawn(async move {
        server.serve(listener, serve_shutdown).await;
    });

    Feed {
        url: format!("ws://{}/", addr),
        poller,
        registry,
        shutdown,
    }
}

fn spawn_poller_loop(feed: &Feed) {
    let poller = feed.poller.clone();
    let shutdown = feed.shutdown.clone();
    tokio::spawn(async move {
        poller.run(shutdown).await;
    });
}

async fn connect(url: &str) -> WsStream {
    let (ws, _) = connect_async(url).await.expect("connect failed");
    ws
}

async fn next_update(ws: &mut WsStream) -> FeedMessage {
    loop {
        let msg = timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("read error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("frame should parse");
        }
    }
}

async fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
    timeout(Duration::from_secs(2), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting until {}", what));
}

#[tokio::test]
async fn test_new_subscriber_receives_catch_up_snapshot() {
    let feed = start_feed(Duration::from_secs(3600)).await;
    feed.poller.tick_once().await;

    let mut ws = connect(&feed.url).await;
    let FeedMessage::MetricsUpdate { timestamp, data } = next_update(&mut ws).await;

    // The catch-up frame is the latest completed snapshot, never blank
    let latest = feed.poller.latest().unwrap();
    assert_eq!(timestamp, latest.generated_at);
    assert_eq!(data.metrics[0].count, 1);

    feed.shutdown.trigger();
}

#[tokio::test]
async fn test_request_update_publishes_to_all_subscribers() {
    let feed = start_feed(Duration::from_secs(3600)).await;
    spawn_poller_loop(&feed);
    wait_until("startup tick", || feed.poller.latest().is_some()).await;

    let mut a = connect(&feed.url).await;
    let FeedMessage::MetricsUpdate { data: a0, .. } = next_update(&mut a).await;
    assert_eq!(a0.metrics[0].count, 1);

    let mut b = connect(&feed.url).await;
    let FeedMessage::MetricsUpdate { data: b0, .. } = next_update(&mut b).await;
    assert_eq!(b0.metrics[0].count, 1);

    a.send(Message::Text(r#"{"type":"request_update"}"#.to_string()))
        .await
        .unwrap();

    let FeedMessage::MetricsUpdate { data: a1, .. } = next_update(&mut a).await;
    let FeedMessage::MetricsUpdate { data: b1, .. } = next_update(&mut b).await;
    assert_eq!(a1.metrics[0].count, 2, "refresh reaches the requester");
    assert_eq!(b1.metrics[0].count, 2, "and every other subscriber");

    feed.shutdown.trigger();
}

#[tokio::test]
async fn test_dead_subscriber_does_not_disrupt_others() {
    let feed = start_feed(Duration::from_secs(3600)).await;
    feed.poller.tick_once().await;

    let mut a = connect(&feed.url).await;
    let _ = next_update(&mut a).await;
    let mut b = connect(&feed.url).await;
    let _ = next_update(&mut b).await;
    assert_eq!(feed.registry.len(), 2);

    drop(b);
    wait_until("dead subscriber removed", || feed.registry.len() == 1).await;

    feed.poller.tick_once().await;
    let FeedMessage::MetricsUpdate { data, .. } = next_update(&mut a).await;
    assert_eq!(data.metrics[0].count, 2, "survivor keeps receiving");

    feed.shutdown.trigger();
}

#[tokio::test]
async fn test_generated_at_monotonic_per_subscriber() {
    let feed = start_feed(Duration::from_secs(3600)).await;
    feed.poller.tick_once().await;

    let mut ws = connect(&feed.url).await;
    let FeedMessage::MetricsUpdate { timestamp, .. } = next_update(&mut ws).await;
    let mut prev = timestamp;

    for _ in 0..5 {
        feed.poller.tick_once().await;
    }
    for _ in 0..5 {
        let FeedMessage::MetricsUpdate { timestamp, .. } = next_update(&mut ws).await;
        assert!(timestamp >= prev, "snapshots must arrive in generation order");
        prev = timestamp;
    }

    feed.shutdown.trigger();
}

#[tokio::test]
async fn test_shutdown_closes_subscribers_and_listener() {
    let feed = start_feed(Duration::from_secs(3600)).await;
    feed.poller.tick_once().await;

    let mut ws = connect(&feed.url).await;
    let _ = next_update(&mut ws).await;

    feed.shutdown.trigger();

    let closed = timeout(Duration::from_secs(2), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None => return true,
                Some(Ok(_)) => {}
                Some(Err(_)) => return true,
            }
        }
    })
    .await
    .expect("subscriber should observe the close");
    assert!(closed);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(
        connect_async(&feed.url).await.is_err(),
        "listener should be gone after shutdown"
    );
}

#[tokio::test]
async fn test_unknown_messages_are_ignored() {
    let feed = start_feed(Duration::from_secs(3600)).await;
    spawn_poller_loop(&feed);
    wait_until("startup tick", || feed.poller.latest().is_some()).await;

    let mut ws = connect(&feed.url).await;
    let _ = next_update(&mut ws).await;

    ws.send(Message::Text("not json at all".to_string()))
        .await
        .unwrap();
    ws.send(Message::Text(r#"{"type":"subscribe"}"#.to_string()))
        .await
        .unwrap();

    // Connection stays healthy and still relays real requests
    ws.send(Message::Text(r#"{"type":"request_update"}"#.to_string()))
        .await
        .unwrap();
    let FeedMessage::MetricsUpdate { data, .. } = next_update(&mut ws).await;
    assert_eq!(data.metrics[0].count, 2);

    feed.shutdown.trigger();
}

#[tokio::test]
async fn test_sdk_subscriber_end_to_end() {
    let feed = start_feed(Duration::from_millis(100)).await;
    spawn_poller_loop(&feed);

    let sub = FeedSubscriber::spawn(
        FeedConfig::new(&feed.url).with_retry_delay(Duration::from_millis(200)),
    )
    .unwrap();

    wait_until("subscriber connected", || sub.state() == FeedState::Connected).await;
    wait_until("first snapshot", || sub.latest().is_some()).await;
    let first = sub.latest().unwrap();

    // Interval ticks keep publishing without being asked
    wait_until("newer snapshot", || {
        sub.latest()
            .map(|s| s.generated_at > first.generated_at)
            .unwrap_or(false)
    })
    .await;
    assert!(sub.request_refresh(), "refresh is accepted while connected");

    feed.shutdown.trigger();
    wait_until("disconnect observed", || sub.state() == FeedState::Disconnected).await;
    assert!(sub.latest().is_some(), "last snapshot survives the outage");

    sub.shutdown().await;
}
