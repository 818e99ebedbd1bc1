//! HTTP API handlers
//!
//! Read-side aggregates, stored reports, and service status. Window
//! selection comes from the `timeRange` query parameter; report creation
//! accepts either a nested `config` object or flat fields.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::error;

use pulseboard_core::{PulseboardError, TimeWindow};
use pulseboard_store::StorePool;

use crate::aggregate::PgSnapshotSource;
use crate::poller::SnapshotPoller;
use crate::registry::SubscriberRegistry;
use crate::reports::{filter_known_categories, ReportConfig, ReportData, ReportStore};

type ApiError = (StatusCode, Json<serde_json::Value>);
type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Clone)]
pub struct ApiContext {
    pub source: Arc<PgSnapshotSource>,
    pub reports: ReportStore,
    pub poller: Arc<SnapshotPoller>,
    pub registry: SubscriberRegistry,
    pub pool: StorePool,
    pub default_window: TimeWindow,
}

pub fn create_router(ctx: ApiContext) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .route("/api/v1/metrics", get(metrics_summary))
        .route("/api/v1/time-series", get(time_series))
        .route("/api/v1/reports", get(list_reports).post(create_report))
        .route("/api/v1/status", get(service_status))
        .with_state(ctx)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn ready_check(State(ctx): State<ApiContext>) -> StatusCode {
    if ctx.pool.is_healthy().await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Resolve the `timeRange` parameter. Absent falls back to the configured
/// default; an unrecognized value is a client error.
fn window_from_query(
    params: &HashMap<String, String>,
    default_window: TimeWindow,
) -> ApiResult<TimeWindow> {
    match params.get("timeRange") {
        None => Ok(default_window),
        Some(raw) => TimeWindow::parse(raw).ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid time range" })),
            )
        }),
    }
}

fn store_failure(context: &'static str, err: impl std::fmt::Display) -> ApiError {
    error!("{}: {}", context, err);
    let mapped = PulseboardError::Store(err.to_string());
    let status = StatusCode::from_u16(mapped.status_code())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({ "error": context, "code": mapped.error_code() })))
}

async fn metrics_summary(
    State(ctx): State<ApiContext>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<serde_json::Value>> {
    let window = window_from_query(&params, ctx.default_window)?;
    let rows = ctx
        .source
        .summaries(window)
        .await
        .map_err(|e| store_failure("Failed to fetch metrics", e))?;
    Ok(Json(json!(rows)))
}

async fn time_series(
    State(ctx): State<ApiContext>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<serde_json::Value>> {
    let window = window_from_query(&params, ctx.default_window)?;
    let rows = ctx
        .source
        .series(window)
        .await
        .map_err(|e| store_failure("Failed to fetch time series", e))?;
    Ok(Json(json!(rows)))
}

async fn list_reports(State(ctx): State<ApiContext>) -> ApiResult<Json<serde_json::Value>> {
    let reports = ctx
        .reports
        .list()
        .await
        .map_err(|e| store_failure("Failed to fetch reports", e))?;
    Ok(Json(json!(reports)))
}

#[derive(Debug, Deserialize)]
pub struct CreateReportRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub config: Option<ReportConfig>,
    pub categories: Option<Vec<String>>,
    pub metrics: Option<Vec<String>>,
    #[serde(rename = "includeTimeSeries")]
    pub include_time_series: Option<bool>,
}

impl CreateReportRequest {
    /// A nested `config` wins; otherwise the flat fields form one. A
    /// request carrying neither has no configuration at all.
    fn report_config(&self) -> Option<ReportConfig> {
        if let Some(config) = &self.config {
            return Some(config.clone());
        }
        if self.categories.is_none() && self.metrics.is_none() && self.include_time_series.is_none()
        {
            return None;
        }
        Some(ReportConfig {
            categories: self.categories.clone().unwrap_or_default(),
            metrics: self.metrics.clone().unwrap_or_default(),
            include_time_series: self.include_time_series.unwrap_or(false),
        })
    }
}

/// Materialize the requested aggregates and, when a name is given, store
/// the report definition alongside them.
async fn create_report(
    State(ctx): State<ApiContext>,
    Json(req): Json<CreateReportRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let Some(config) = req.report_config() else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Config is required" })),
        ));
    };

    // Reports always cover the last day
    let window = TimeWindow::Last24Hours;

    let data = if config.categories.is_empty() {
        ReportData::default()
    } else {
        let filtered = filter_known_categories(&config.categories);
        if filtered.is_empty() {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid categories provided" })),
            ));
        }
        let scoped = ReportConfig {
            categories: filtered,
            ..config.clone()
        };
        ctx.reports
            .materialize(&scoped, window)
            .await
            .map_err(|e| store_failure("Failed to create report", e))?
    };

    // The stored definition keeps the categories as submitted
    match &req.name {
        Some(name) => {
            let report = ctx
                .reports
                .create(name, req.description.as_deref(), &config)
                .await
                .map_err(|e| store_failure("Failed to create report", e))?;
            Ok(Json(json!({ "report": report, "data": data })))
        }
        None => Ok(Json(json!({ "data": data }))),
    }
}

async fn service_status(State(ctx): State<ApiContext>) -> Json<serde_json::Value> {
    let stats = ctx.registry.stats();
    let last_snapshot_at = ctx.poller.latest().map(|s| s.generated_at);

    Json(json!({
        "subscribers": stats,
        "last_snapshot_at": last_snapshot_at,
        "default_window": ctx.default_window.as_param(),
    }))
}
