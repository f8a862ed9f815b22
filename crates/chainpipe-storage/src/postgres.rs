//! PostgreSQL checkpoint backend.
//!
//! # Feature Flag
//! Requires the `postgres` feature:
//! ```toml
//! chainpipe-storage = { version = "0.2", features = ["postgres"] }
//! ```
//!
//! # Schema
//! Created on connect, one append-only table per stream:
//! - `processed_block_transactions`
//! - `processed_block_events`
//!
//! Each row is `(id, height, processed_at, status)`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use chainpipe_core::checkpoint::{Checkpoint, CheckpointStatus, CheckpointStore, StreamKind};
use chainpipe_core::error::PipelineError;

use crate::table_name;

// ─── Connection options ────────────────────────────────────────────────────────

/// Connection options for the Postgres storage backend.
#[derive(Debug, Clone)]
pub struct PostgresOptions {
    /// Maximum number of connections in the pool (default: 10)
    pub max_connections: u32,
    /// Minimum number of idle connections to keep open (default: 1)
    pub min_connections: u32,
    /// Connection timeout in seconds (default: 30)
    pub connect_timeout_secs: u64,
}

impl Default for PostgresOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 30,
        }
    }
}

fn storage_err(e: sqlx::Error) -> PipelineError {
    PipelineError::Storage(e.to_string())
}

// ─── PostgresStorage ─────────────────────────────────────────────────────────

/// Cheaply cloneable; wraps a connection pool.
#[derive(Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Connect and create the tables if needed.
    ///
    /// `postgresql://[user[:password]@][host][:port][/dbname]`
    pub async fn connect(database_url: &str) -> Result<Self, PipelineError> {
        Self::connect_with_options(database_url, PostgresOptions::default()).await
    }

    pub async fn connect_with_options(
        database_url: &str,
        opts: PostgresOptions,
    ) -> Result<Self, PipelineError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(opts.max_connections)
            .min_connections(opts.min_connections)
            .acquire_timeout(Duration::from_secs(opts.connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| PipelineError::Storage(format!("postgres connect: {e}")))?;

        let storage = Self { pool };
        storage.init_schema().await?;
        info!("PostgresStorage connected and schema initialized");
        Ok(storage)
    }

    async fn init_schema(&self) -> Result<(), PipelineError> {
        for stream in [StreamKind::Transactions, StreamKind::Events] {
            let table = table_name(stream);
            sqlx::query(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id           BIGSERIAL   PRIMARY KEY,
                    height       BIGINT      NOT NULL,
                    processed_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    status       TEXT        NOT NULL
                )"
            ))
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

            sqlx::query(&format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_height ON {table}(height DESC)"
            ))
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        }

        debug!("PostgresStorage schema initialized");
        Ok(())
    }

    /// Delete every record of `stream` above `height`.
    pub async fn rollback_after(&self, stream: StreamKind, height: i64) -> Result<u64, PipelineError> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE height > $1",
            table_name(stream)
        ))
        .bind(height)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        debug!(%stream, height, removed = result.rows_affected(), "rolled back checkpoints");
        Ok(result.rows_affected())
    }

    /// Get the underlying connection pool (for custom queries).
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ─── CheckpointStore impl ─────────────────────────────────────────────────────

#[async_trait]
impl CheckpointStore for PostgresStorage {
    async fn save(&self, stream: StreamKind, checkpoint: &Checkpoint) -> Result<(), PipelineError> {
        sqlx::query(&format!(
            "INSERT INTO {} (height, processed_at, status) VALUES ($1, $2, $3)",
            table_name(stream)
        ))
        .bind(checkpoint.height)
        .bind(checkpoint.processed_at)
        .bind(checkpoint.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        debug!(%stream, height = checkpoint.height, "checkpoint saved");
        Ok(())
    }

    async fn last_processed(&self, stream: StreamKind) -> Result<Checkpoint, PipelineError> {
        let row = sqlx::query(&format!(
            "SELECT id, height, processed_at, status FROM {} ORDER BY height DESC LIMIT 1",
            table_name(stream)
        ))
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        let Some(row) = row else {
            return Ok(Checkpoint::default());
        };
        Ok(Checkpoint {
            id: row.try_get::<i64, _>("id").map_err(storage_err)?,
            height: row.try_get::<i64, _>("height").map_err(storage_err)?,
            processed_at: row
                .try_get::<DateTime<Utc>, _>("processed_at")
                .map_err(storage_err)?,
            status: row
                .try_get::<String, _>("status")
                .map_err(storage_err)?
                .parse::<CheckpointStatus>()?,
        })
    }
}
