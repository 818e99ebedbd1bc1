//! Pulseboard Store
//!
//! PostgreSQL access for the metrics platform: connection pooling over
//! deadpool, the schema the platform reads and seeds, and store errors.

mod error;
mod pool;
mod schema;

pub use error::{Result, StoreError};
pub use pool::{PoolConfig, StorePool};
pub use schema::ensure_schema;

/// Re-export tokio-postgres types for convenience
pub use tokio_postgres::{types::ToSql, Row};
