//! Metrics Broadcast entrypoint

use std::sync::Arc;
use tracing::info;

use metrics_broadcast::MetricsBroadcastService;
use pulseboard_core::{Result, ServiceRuntime};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("metrics_broadcast=debug".parse().unwrap()),
        )
        .json()
        .init();

    info!("Starting Metrics Broadcast");

    let service = Arc::new(MetricsBroadcastService::new().await?);
    ServiceRuntime::run(service).await
}
