//! LeadGrid Database Layer
//!
//! `SQLite` persistence for the collection pipeline, built on `SQLx` with
//! embedded migrations.
//!
//! # Tables
//!
//! - `jobs`: one collection request with its three layer sub-states
//! - `leads`: the merged lead set per job, unique on `(job_id, source_id)`
//! - `batches`: ordered groups of jobs
//! - `tasks`: durable log of queued work, used for crash recovery
//!
//! Deleting a job deletes its leads; deleting a batch deletes its jobs.
//!
//! # Example
//!
//! ```ignore
//! use leadgrid_db::Database;
//!
//! let db = Database::new("leadgrid.db", 5).await?;
//! db.run_migrations().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod batches;
pub mod connection;
pub mod error;
pub mod jobs;
pub mod leads;
pub mod migrations;
pub mod tasks;

pub use batches::{Batch, BatchStatus};
pub use error::{DatabaseError, Result};
pub use jobs::{
    truncate_error, Job, JobStatus, Layer, LayerRecord, LayerState, LocationType, NewJob,
    MAX_ERROR_LEN,
};
pub use tasks::{TaskRecord, TaskStatus};

use leadgrid_core::DatabaseConfig;
use sqlx::{Pool, Sqlite};
use std::path::Path;

/// Handle to the `LeadGrid` database.
///
/// Cloning is cheap; clones share the same pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Open (or create) the database at `path`.
    pub async fn new(path: impl AsRef<Path>, max_connections: u32) -> Result<Self> {
        let pool = connection::connect(path, max_connections).await?;
        Ok(Self { pool })
    }

    /// Open the database described by `config`, creating its parent directory.
    pub async fn open(path: &Path, config: &DatabaseConfig) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        Self::new(path, config.max_connections).await
    }

    /// Open a private in-memory database with the schema applied.
    pub async fn in_memory() -> Result<Self> {
        let db = Self::new(":memory:", 1).await?;
        db.run_migrations().await?;
        Ok(db)
    }

    /// Wrap an existing pool.
    #[must_use]
    pub fn from_pool(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Run all pending database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        migrations::run_migrations(&self.pool).await
    }

    /// Latest applied migration version.
    pub async fn get_schema_version(&self) -> Result<i64> {
        migrations::get_schema_version(&self.pool).await
    }

    /// Get a reference to the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Close the connection pool gracefully.
    pub async fn close(self) {
        self.pool.close().await;
        tracing::info!("Database pool closed");
    }
}
