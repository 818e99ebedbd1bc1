//! Aggregation Query Layer
//!
//! Computes the two aggregate views a snapshot carries: per-category
//! summary statistics and a bucketed time series, both over a trailing
//! window. Read-only against the store and safe to call concurrently.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use pulseboard_core::{CategorySummary, SnapshotData, TimeBucketPoint, TimeWindow};
use pulseboard_store::{StoreError, StorePool};

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    #[error("Source error: {0}")]
    Source(String),
}

pub type Result<T> = std::result::Result<T, AggregateError>;

/// Where snapshots come from. The poller only sees this seam, so tests
/// drive it with scripted sources instead of a database.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self, window: TimeWindow) -> Result<SnapshotData>;
}

/// The window bound and bucket granularity are derived from the
/// `TimeWindow` enum and bound as parameters, so no user-supplied text can
/// reach an interval or DATE_TRUNC expression.
const SUMMARY_SQL: &str = r#"
    SELECT
        category,
        COUNT(*) AS count,
        AVG(value) AS avg_value,
        SUM(value) AS total_value,
        MAX(value) AS max_value,
        MIN(value) AS min_value,
        MAX(timestamp) AS latest_timestamp
    FROM metrics
    WHERE timestamp > NOW() - make_interval(hours => $1)
    GROUP BY category
    ORDER BY category
"#;

const SERIES_SQL: &str = r#"
    SELECT
        DATE_TRUNC($2::text, timestamp) AS bucket,
        category,
        AVG(value) AS avg_value,
        COUNT(*) AS count
    FROM metrics
    WHERE timestamp > NOW() - make_interval(hours => $1)
    GROUP BY bucket, category
    ORDER BY bucket, category
"#;

/// Aggregation queries over the PostgreSQL metrics store
pub struct PgSnapshotSource {
    pool: StorePool,
}

impl PgSnapshotSource {
    pub fn new(pool: StorePool) -> Self {
        Self { pool }
    }

    /// Per-category summaries over the window, ordered by category.
    pub async fn summaries(&self, window: TimeWindow) -> Result<Vec<CategorySummary>> {
        let conn = self.pool.get().await?;
        let hours = window.hours() as i32;

        let rows = conn.query(SUMMARY_SQL, &[&hours]).await?;
        let summaries = rows
            .iter()
            .map(|row| {
                let count: i64 = row.get(1);
                CategorySummary {
                    category: row.get(0),
                    count: count as u64,
                    avg: row.get(2),
                    sum: row.get(3),
                    max: row.get(4),
                    min: row.get(5),
                    latest_timestamp: row.get::<_, DateTime<Utc>>(6),
                }
            })
            .collect();

        Ok(summaries)
    }

    /// Bucketed time series over the window, ordered by bucket then category.
    pub async fn series(&self, window: TimeWindow) -> Result<Vec<TimeBucketPoint>> {
        let conn = self.pool.get().await?;
        let hours = window.hours() as i32;
        let bucket = window.bucket().as_sql();

        let rows = conn.query(SERIES_SQL, &[&hours, &bucket]).await?;
        let points = rows
            .iter()
            .map(|row| {
                let count: i64 = row.get(3);
                TimeBucketPoint {
                    bucket_start: row.get::<_, DateTime<Utc>>(0),
                    category: row.get(1),
                    avg: row.get(2),
                    count: count as u64,
                }
            })
            .collect();

        Ok(points)
    }
}

#[async_trait]
impl SnapshotSource for PgSnapshotSource {
    async fn fetch(&self, window: TimeWindow) -> Result<SnapshotData> {
        let metrics = self.summaries(window).await?;
        let time_series = self.series(window).await?;

        debug!(
            window = window.as_param(),
            categories = metrics.len(),
            points = time_series.len(),
            "Snapshot data fetched"
        );

        Ok(SnapshotData {
            metrics,
            time_series,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulseboard_store::{ensure_schema, PoolConfig};

    async fn seeded_pool() -> Option<StorePool> {
        // Requires a dedicated test database; skip in CI without one
        if std::env::var("DATABASE_URL").is_err() {
            return None;
        }
        let pool = StorePool::new(PoolConfig::from_env().unwrap()).await.unwrap();
        ensure_schema(&pool).await.unwrap();
        Some(pool)
    }

    /// Three samples within the hour: revenue 100.0, revenue 200.0, users
    /// 50.0. Summaries come back alphabetical; series ordered by bucket
    /// then category.
    #[tokio::test]
    async fn test_example_scenario_against_live_store() {
        let Some(pool) = seeded_pool().await else {
            return;
        };
        let conn = pool.get().await.unwrap();
        conn.batch_execute("TRUNCATE metrics").await.unwrap();

        let base = Utc::now() - chrono::Duration::minutes(30);
        let samples: [(&str, f64, i64); 3] = [
            ("revenue", 100.0, 0),
            ("revenue", 200.0, 10),
            ("users", 50.0, 20),
        ];
        for (category, value, offset_min) in samples {
            let ts = base + chrono::Duration::minutes(offset_min);
            let name = format!("{}_sample", category);
            conn.execute(
                "INSERT INTO metrics (name, value, category, timestamp) VALUES ($1, $2, $3, $4)",
                &[&name, &value, &category, &ts],
            )
            .await
            .unwrap();
        }

        let source = PgSnapshotSource::new(pool.clone());
        let data = source.fetch(TimeWindow::LastHour).await.unwrap();

        assert_eq!(data.metrics.len(), 2);
        let revenue = &data.metrics[0];
        assert_eq!(revenue.category, "revenue");
        assert_eq!(revenue.count, 2);
        assert!((revenue.avg - 150.0).abs() < 1e-9);
        assert!((revenue.sum - 300.0).abs() < 1e-9);
        assert!((revenue.max - 200.0).abs() < 1e-9);
        assert!((revenue.min - 100.0).abs() < 1e-9);

        let users = &data.metrics[1];
        assert_eq!(users.category, "users");
        assert_eq!(users.count, 1);
        assert!((users.avg - 50.0).abs() < 1e-9);

        // Minute buckets for the 1h window: one point per sample, ordered
        // by bucket_start then category
        assert_eq!(data.time_series.len(), 3);
        let mut sorted = data.time_series.clone();
        sorted.sort_by(|a, b| {
            a.bucket_start
                .cmp(&b.bucket_start)
                .then_with(|| a.category.cmp(&b.category))
        });
        assert_eq!(data.time_series, sorted);

        conn.batch_execute("TRUNCATE metrics").await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_window_yields_empty_views() {
        let Some(pool) = seeded_pool().await else {
            return;
        };
        let conn = pool.get().await.unwrap();
        conn.batch_execute("TRUNCATE metrics").await.unwrap();

        let source = PgSnapshotSource::new(pool.clone());
        let data = source.fetch(TimeWindow::Last24Hours).await.unwrap();
        assert!(data.metrics.is_empty());
        assert!(data.time_series.is_empty());
    }
}
