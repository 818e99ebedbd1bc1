//! Stored reports
//!
//! A report is a saved filter configuration: the categories it covers plus
//! presentation options. Materializing a report runs the same aggregates as
//! the snapshot poller, scoped to the report's categories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pulseboard_core::{CategorySummary, TimeBucketPoint, TimeWindow, KNOWN_CATEGORIES};
use pulseboard_store::{Result, Row, StoreError, StorePool};

const LIST_REPORTS_SQL: &str = r#"
    SELECT id, name, description, config, created_at
    FROM reports
    ORDER BY created_at DESC
"#;

const INSERT_REPORT_SQL: &str = r#"
    INSERT INTO reports (name, description, config)
    VALUES ($1, $2, $3)
    RETURNING id, name, description, config, created_at
"#;

const SCOPED_SUMMARY_SQL: &str = r#"
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
      AND category = ANY($2)
    GROUP BY category
    ORDER BY category
"#;

const SCOPED_SERIES_SQL: &str = r#"
    SELECT
        DATE_TRUNC($3::text, timestamp) AS bucket,
        category,
        AVG(value) AS avg_value,
        COUNT(*) AS count
    FROM metrics
    WHERE timestamp > NOW() - make_interval(hours => $1)
      AND category = ANY($2)
    GROUP BY bucket, category
    ORDER BY bucket, category
"#;

/// Report filter configuration, stored as JSONB.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub metrics: Vec<String>,
    #[serde(default, rename = "includeTimeSeries")]
    pub include_time_series: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub config: ReportConfig,
    pub created_at: DateTime<Utc>,
}

/// Aggregates materialized for a report. The time series is present only
/// when the report asks for it.
#[derive(Debug, Default, Serialize)]
pub struct ReportData {
    pub metrics: Vec<CategorySummary>,
    #[serde(rename = "timeSeries", skip_serializing_if = "Option::is_none")]
    pub time_series: Option<Vec<TimeBucketPoint>>,
}

/// Normalize category names and drop any outside the known set. Callers
/// decide whether an empty result is an error.
pub fn filter_known_categories(requested: &[String]) -> Vec<String> {
    requested
        .iter()
        .map(|c| c.to_lowercase())
        .filter(|c| KNOWN_CATEGORIES.contains(&c.as_str()))
        .collect()
}

#[derive(Clone)]
pub struct ReportStore {
    pool: StorePool,
}

impl ReportStore {
    pub fn new(pool: StorePool) -> Self {
        Self { pool }
    }

    /// All stored reports, newest first.
    pub async fn list(&self) -> Result<Vec<Report>> {
        let conn = self.pool.get().await?;
        let rows = conn
            .query(LIST_REPORTS_SQL, &[])
            .await
            .map_err(StoreError::Query)?;
        rows.iter().map(row_to_report).collect()
    }

    pub async fn create(
        &self,
        name: &str,
        description: Option<&str>,
        config: &ReportConfig,
    ) -> Result<Report> {
        let conn = self.pool.get().await?;
        let config_json = serde_json::to_value(config)?;
        let row = conn
            .query_one(INSERT_REPORT_SQL, &[&name, &description, &config_json])
            .await
            .map_err(StoreError::Query)?;
        row_to_report(&row)
    }

    /// Per-category summaries restricted to the given categories.
    pub async fn summaries_for(
        &self,
        categories: &[String],
        window: TimeWindow,
    ) -> Result<Vec<CategorySummary>> {
        let conn = self.pool.get().await?;
        let hours = window.hours() as i32;

        let rows = conn
            .query(SCOPED_SUMMARY_SQL, &[&hours, &categories])
            .await
            .map_err(StoreError::Query)?;
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

    /// Bucketed series restricted to the given categories.
    pub async fn series_for(
        &self,
        categories: &[String],
        window: TimeWindow,
    ) -> Result<Vec<TimeBucketPoint>> {
        let conn = self.pool.get().await?;
        let hours = window.hours() as i32;
        let bucket = window.bucket().as_sql();

        let rows = conn
            .query(SCOPED_SERIES_SQL, &[&hours, &categories, &bucket])
            .await
            .map_err(StoreError::Query)?;
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

    /// Materialize the aggregates a report's configuration selects.
    pub async fn materialize(&self, config: &ReportConfig, window: TimeWindow) -> Result<ReportData> {
        let metrics = self.summaries_for(&config.categories, window).await?;
        let time_series = if config.include_time_series {
            Some(self.series_for(&config.categories, window).await?)
        } else {
            None
        };

        Ok(ReportData { metrics, time_series })
    }
}

fn row_to_report(row: &Row) -> Result<Report> {
    let config_json: serde_json::Value = row.get(3);
    let config = serde_json::from_value(config_json)?;

    Ok(Report {
        id: row.get(0),
        name: row.get(1),
        description: row.get(2),
        config,
        created_at: row.get::<_, DateTime<Utc>>(4),
    })
}
