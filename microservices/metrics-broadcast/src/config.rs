//! Metrics Broadcast configuration

use pulseboard_core::{PulseboardError, Result, TimeWindow};

#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    pub database_url: String,
    pub ws_bind: String,
    pub http_bind: String,
    pub poll_interval_secs: u64,
    pub default_window: TimeWindow,
    pub db_pool_size: usize,
}

impl BroadcastConfig {
    pub fn from_env() -> Result<Self> {
        // The store connection string has no sensible default; refusing to
        // start beats broadcasting from a guessed localhost.
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| PulseboardError::Config("DATABASE_URL is not set".to_string()))?;

        let default_window = match std::env::var("DEFAULT_WINDOW") {
            Ok(raw) => TimeWindow::parse(&raw).ok_or_else(|| {
                PulseboardError::Config(format!("Invalid DEFAULT_WINDOW: {}", raw))
            })?,
            Err(_) => TimeWindow::default(),
        };

        Ok(Self {
            database_url,
            ws_bind: std::env::var("WS_BIND").unwrap_or_else(|_| "0.0.0.0:3001".to_string()),
            http_bind: std::env::var("HTTP_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            poll_interval_secs: std::env::var("POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .map_err(|e| PulseboardError::Config(format!("Invalid POLL_INTERVAL_SECS: {}", e)))?,
            default_window,
            db_pool_size: std::env::var("DB_POOL_SIZE")
                .unwrap_or_else(|_| "16".to_string())
                .parse()
                .map_err(|e| PulseboardError::Config(format!("Invalid DB_POOL_SIZE: {}", e)))?,
        })
    }
}
