//! Batch records: ordered groups of jobs.

use crate::error::{DatabaseError, Result};
use crate::jobs::{parse_optional_timestamp, parse_timestamp, to_u32};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

/// Status of a batch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Waiting to run
    Pending,
    /// Jobs are being processed
    Running,
    /// Every job completed
    Completed,
    /// Every job failed
    Failed,
    /// Some jobs failed
    PartiallyFailed,
}

impl BatchStatus {
    /// Stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::PartiallyFailed => "partially_failed",
        }
    }

    /// Parse the stored representation.
    pub fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "pending" => Self::Pending,
            "running" => Self::Running,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "partially_failed" => Self::PartiallyFailed,
            other => {
                return Err(DatabaseError::Decode(format!("unknown batch status '{other}'")))
            }
        })
    }

    /// Final status from the aggregate job counts.
    #[must_use]
    pub const fn from_counts(completed: u32, failed: u32) -> Self {
        if failed == 0 {
            Self::Completed
        } else if completed == 0 {
            Self::Failed
        } else {
            Self::PartiallyFailed
        }
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A batch of jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    /// Unique identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Address for the summary notification
    pub notify_email: Option<String>,
    /// Current status
    pub status: BatchStatus,
    /// Jobs in the batch
    pub total_jobs: u32,
    /// Jobs whose primary layer completed
    pub completed_jobs: u32,
    /// Jobs whose primary layer failed
    pub failed_jobs: u32,
    /// Queue task running the batch
    pub task_id: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
    /// When the batch finished
    pub completed_at: Option<DateTime<Utc>>,
}

fn batch_from_row(row: &SqliteRow) -> Result<Batch> {
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Batch {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        notify_email: row.try_get("notify_email")?,
        status: BatchStatus::parse(&status)?,
        total_jobs: to_u32(row.try_get("total_jobs")?),
        completed_jobs: to_u32(row.try_get("completed_jobs")?),
        failed_jobs: to_u32(row.try_get("failed_jobs")?),
        task_id: row.try_get("task_id")?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
        completed_at: parse_optional_timestamp(row.try_get("completed_at")?)?,
    })
}

/// Insert a new pending batch.
pub async fn create_batch(
    pool: &Pool<Sqlite>,
    name: &str,
    notify_email: Option<&str>,
    total_jobs: u32,
) -> Result<Batch> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO batches (id, name, notify_email, status, total_jobs, created_at, updated_at)
         VALUES (?, ?, ?, 'pending', ?, ?, ?)",
    )
    .bind(&id)
    .bind(name)
    .bind(notify_email)
    .bind(i64::from(total_jobs))
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    require_batch(pool, &id).await
}

/// Fetch a batch by ID.
pub async fn get_batch(pool: &Pool<Sqlite>, id: &str) -> Result<Option<Batch>> {
    let row = sqlx::query(
        "SELECT id, name, notify_email, status, total_jobs, completed_jobs, failed_jobs, task_id, created_at, updated_at, completed_at
         FROM batches WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(batch_from_row).transpose()
}

/// Fetch a batch by ID, failing if it does not exist.
pub async fn require_batch(pool: &Pool<Sqlite>, id: &str) -> Result<Batch> {
    get_batch(pool, id)
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("batch {id} not found")))
}

/// Set the batch status; terminal statuses stamp `completed_at`.
pub async fn update_status(pool: &Pool<Sqlite>, id: &str, status: BatchStatus) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let finished = matches!(
        status,
        BatchStatus::Completed | BatchStatus::Failed | BatchStatus::PartiallyFailed
    );

    sqlx::query("UPDATE batches SET status = ?, completed_at = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(finished.then(|| now.clone()))
        .bind(&now)
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Count one finished job toward the batch aggregates.
pub async fn record_job_result(pool: &Pool<Sqlite>, id: &str, succeeded: bool) -> Result<()> {
    let column = if succeeded {
        "completed_jobs"
    } else {
        "failed_jobs"
    };
    sqlx::query(&format!(
        "UPDATE batches SET {column} = {column} + 1, updated_at = ? WHERE id = ?"
    ))
    .bind(Utc::now().to_rfc3339())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Record the queue task running the batch.
pub async fn set_task_id(pool: &Pool<Sqlite>, id: &str, task_id: Option<&str>) -> Result<()> {
    sqlx::query("UPDATE batches SET task_id = ?, updated_at = ? WHERE id = ?")
        .bind(task_id)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}
