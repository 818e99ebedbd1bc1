//! Seeds the metrics store with sample data for local development.
//!
//! Applies the schema DDL, then inserts `SEED_ROWS` samples (default 1000)
//! at one-minute spacing backwards from now, randomly spread across the
//! known categories with per-category value ranges.

use anyhow::Context;
use chrono::{Duration, Utc};
use rand::Rng;
use tracing::info;

use pulseboard_core::KNOWN_CATEGORIES;
use pulseboard_store::{ensure_schema, PoolConfig, StorePool};

const DEFAULT_ROWS: usize = 1000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("seed_metrics=info".parse().unwrap()),
        )
        .init();

    let rows: usize = match std::env::var("SEED_ROWS") {
        Ok(raw) => raw.parse().context("SEED_ROWS must be a number")?,
        Err(_) => DEFAULT_ROWS,
    };

    let config = PoolConfig::from_env().context("store configuration")?;
    let pool = StorePool::new(config).await.context("store connection")?;
    ensure_schema(&pool).await.context("schema setup")?;

    let conn = pool.get().await?;
    let now = Utc::now();
    let mut rng = rand::thread_rng();

    for i in 0..rows {
        let category = KNOWN_CATEGORIES[rng.gen_range(0..KNOWN_CATEGORIES.len())];
        let value = sample_value(category, &mut rng);
        let name = format!("{}_metric_{}", category, i);
        let timestamp = now - Duration::minutes(i as i64);

        conn.execute(
            "INSERT INTO metrics (name, value, category, timestamp) VALUES ($1, $2, $3, $4)",
            &[&name, &value, &category, &timestamp],
        )
        .await
        .with_context(|| format!("inserting row {}", i))?;
    }

    info!(rows, "Seeded metrics store");
    Ok(())
}

/// Per-category value ranges matching the dashboard's sample data. User
/// counts are whole numbers.
fn sample_value(category: &str, rng: &mut impl Rng) -> f64 {
    match category {
        "revenue" => rng.gen_range(5000.0..15000.0),
        "users" => rng.gen_range(1000.0..6000.0_f64).floor(),
        "conversion" => rng.gen_range(2.0..12.0),
        "engagement" => rng.gen_range(50.0..150.0),
        "performance" => rng.gen_range(500.0..2500.0),
        _ => rng.gen_range(0.0..1000.0),
    }
}
