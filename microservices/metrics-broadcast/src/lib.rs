//! Metrics Broadcast Service
//!
//! Polls PostgreSQL metric aggregates on a fixed cadence and fans each
//! snapshot out to WebSocket subscribers. An HTTP API serves the same
//! aggregates on demand along with stored reports and service status.

pub mod aggregate;
pub mod api;
pub mod config;
pub mod poller;
pub mod registry;
pub mod reports;
pub mod server;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use pulseboard_core::{
    DependencyStatus, HealthStatus, PulseboardError, PulseboardService, ReadinessStatus, Result,
    ShutdownSignal,
};
use pulseboard_store::{PoolConfig, StorePool};

use aggregate::PgSnapshotSource;
use api::ApiContext;
use config::BroadcastConfig;
use poller::SnapshotPoller;
use registry::SubscriberRegistry;
use reports::ReportStore;
use server::BroadcastServer;

pub struct MetricsBroadcastService {
    config: BroadcastConfig,
    pool: StorePool,
    source: Arc<PgSnapshotSource>,
    registry: SubscriberRegistry,
    poller: Arc<SnapshotPoller>,
    server: BroadcastServer,
    shutdown: ShutdownSignal,
    start_time: std::time::Instant,
}

impl MetricsBroadcastService {
    pub async fn new() -> Result<Self> {
        let config = BroadcastConfig::from_env()?;

        let pool_config =
            PoolConfig::new(&config.database_url).with_max_size(config.db_pool_size);
        let pool = StorePool::new(pool_config)
            .await
            .map_err(|e| PulseboardError::Store(e.to_string()))?;

        let source = Arc::new(PgSnapshotSource::new(pool.clone()));
        let registry = SubscriberRegistry::new();
        let poller = Arc::new(SnapshotPoller::new(
            source.clone(),
            registry.clone(),
            config.default_window,
            Duration::from_secs(config.poll_interval_secs),
        ));
        let server = BroadcastServer::new(&config.ws_bind, registry.clone(), poller.clone());

        Ok(Self {
            config,
            pool,
            source,
            registry,
            poller,
            server,
            shutdown: ShutdownSignal::new(),
            start_time: std::time::Instant::now(),
        })
    }
}

#[async_trait]
impl PulseboardService for MetricsBroadcastService {
    fn service_id(&self) -> &'static str {
        "metrics-broadcast"
    }

    async fn health(&self) -> HealthStatus {
        HealthStatus {
            healthy: true,
            service_id: self.service_id().to_string(),
            version: self.version().to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    async fn ready(&self) -> ReadinessStatus {
        let store_available = self.pool.is_healthy().await;
        let feed_available = self.server.is_running();
        ReadinessStatus {
            ready: store_available && feed_available,
            dependencies: vec![
                DependencyStatus {
                    name: "store".to_string(),
                    available: store_available,
                },
                DependencyStatus {
                    name: "broadcast_server".to_string(),
                    available: feed_available,
                },
            ],
        }
    }

    async fn shutdown(&self) -> Result<()> {
        info!("Shutting down Metrics Broadcast");
        self.shutdown.trigger();
        self.pool.close();
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        info!(
            ws = %self.config.ws_bind,
            http = %self.config.http_bind,
            poll_interval_secs = self.config.poll_interval_secs,
            window = self.config.default_window.as_param(),
            "Starting Metrics Broadcast"
        );

        // First poll lands before any subscriber or HTTP request arrives,
        // so catch-up frames are available from the first accept on.
        self.poller.tick_once().await;

        let poller = self.poller.clone();
        let poller_shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            poller.run(poller_shutdown).await;
        });

        let server = self.server.clone();
        let server_shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = server.run(server_shutdown).await {
                error!("Broadcast server error: {}", e);
            }
        });

        let ctx = ApiContext {
            source: self.source.clone(),
            reports: ReportStore::new(self.pool.clone()),
            poller: self.poller.clone(),
            registry: self.registry.clone(),
            pool: self.pool.clone(),
            default_window: self.config.default_window,
        };
        let app = api::create_router(ctx);

        let listener = tokio::net::TcpListener::bind(&self.config.http_bind).await?;
        let http_shutdown = self.shutdown.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { http_shutdown.cancelled().await })
            .await?;

        Ok(())
    }
}
