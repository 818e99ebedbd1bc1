//! Schema bootstrap for the metrics store

use tracing::info;

use crate::{Result, StoreError, StorePool};

/// Tables the platform reads and seeds. `metrics` is append-only sample
/// data; `reports` holds saved report configurations as JSONB.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS metrics (
    id          BIGSERIAL PRIMARY KEY,
    name        TEXT NOT NULL,
    value       DOUBLE PRECISION NOT NULL,
    category    TEXT NOT NULL,
    timestamp   TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_metrics_category_timestamp
    ON metrics (category, timestamp);
CREATE INDEX IF NOT EXISTS idx_metrics_timestamp
    ON metrics (timestamp);

CREATE TABLE IF NOT EXISTS reports (
    id          BIGSERIAL PRIMARY KEY,
    name        TEXT NOT NULL,
    description TEXT,
    config      JSONB NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
"#;

/// Apply the platform schema. Idempotent: every statement is IF NOT EXISTS.
pub async fn ensure_schema(pool: &StorePool) -> Result<()> {
    let conn = pool.get().await?;
    conn.batch_execute(SCHEMA).await.map_err(StoreError::Query)?;
    info!("Store schema ensured");
    Ok(())
}
