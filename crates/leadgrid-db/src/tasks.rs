//! Durable task log backing the work queue.
//!
//! Every unit of work is recorded here before it is spawned. Rows left
//! `queued` or `running` after a crash are picked up again on recovery.

use crate::error::{DatabaseError, Result};
use crate::jobs::{parse_timestamp, to_u32, truncate_error};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

/// Lifecycle of a queued task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Recorded, not started
    Queued,
    /// Started
    Running,
    /// Ran to completion
    Finished,
    /// Ended with an error
    Failed,
    /// Cancelled before or while running
    Revoked,
}

impl TaskStatus {
    /// Stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Failed => "failed",
            Self::Revoked => "revoked",
        }
    }

    /// Parse the stored representation.
    pub fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "queued" => Self::Queued,
            "running" => Self::Running,
            "finished" => Self::Finished,
            "failed" => Self::Failed,
            "revoked" => Self::Revoked,
            other => {
                return Err(DatabaseError::Decode(format!("unknown task status '{other}'")))
            }
        })
    }
}

/// A stored task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Unique identifier
    pub id: String,
    /// Short task kind, for logs and filtering
    pub kind: String,
    /// Serialized task description
    pub payload: String,
    /// Current status
    pub status: TaskStatus,
    /// Times the task was started
    pub attempts: u32,
    /// Failure text
    pub error: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

fn task_from_row(row: &SqliteRow) -> Result<TaskRecord> {
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(TaskRecord {
        id: row.try_get("id")?,
        kind: row.try_get("kind")?,
        payload: row.try_get("payload")?,
        status: TaskStatus::parse(&status)?,
        attempts: to_u32(row.try_get("attempts")?),
        error: row.try_get("error")?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

/// Record a new queued task.
pub async fn insert_task(pool: &Pool<Sqlite>, id: &str, kind: &str, payload: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT INTO tasks (id, kind, payload, status, attempts, created_at, updated_at)
         VALUES (?, ?, ?, 'queued', 0, ?, ?)",
    )
    .bind(id)
    .bind(kind)
    .bind(payload)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch a task by ID.
pub async fn get_task(pool: &Pool<Sqlite>, id: &str) -> Result<Option<TaskRecord>> {
    let row = sqlx::query(
        "SELECT id, kind, payload, status, attempts, error, created_at, updated_at FROM tasks WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(task_from_row).transpose()
}

/// Mark a task started, counting the attempt.
///
/// Returns `false` if the task was revoked or already ended.
pub async fn mark_running(pool: &Pool<Sqlite>, id: &str) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE tasks SET status = 'running', attempts = attempts + 1, updated_at = ?
         WHERE id = ? AND status IN ('queued', 'running')",
    )
    .bind(Utc::now().to_rfc3339())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Mark a task ended. A revoked task stays revoked.
pub async fn mark_done(
    pool: &Pool<Sqlite>,
    id: &str,
    status: TaskStatus,
    error: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "UPDATE tasks SET status = ?, error = ?, updated_at = ? WHERE id = ? AND status != 'revoked'",
    )
    .bind(status.as_str())
    .bind(error.map(truncate_error))
    .bind(Utc::now().to_rfc3339())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Mark a task revoked. Returns `false` if it had already ended.
pub async fn mark_revoked(pool: &Pool<Sqlite>, id: &str) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE tasks SET status = 'revoked', updated_at = ?
         WHERE id = ? AND status IN ('queued', 'running')",
    )
    .bind(Utc::now().to_rfc3339())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Tasks left queued or running, oldest first.
pub async fn list_unfinished(pool: &Pool<Sqlite>) -> Result<Vec<TaskRecord>> {
    let rows = sqlx::query(
        "SELECT id, kind, payload, status, attempts, error, created_at, updated_at
         FROM tasks WHERE status IN ('queued', 'running') ORDER BY rowid",
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(task_from_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    #[tokio::test]
    async fn test_task_lifecycle() {
        let db = Database::in_memory().await.expect("create test database");
        insert_task(db.pool(), "t1", "primary", "{}").await.expect("insert");

        assert!(mark_running(db.pool(), "t1").await.expect("running"));
        mark_done(db.pool(), "t1", TaskStatus::Failed, Some("boom"))
            .await
            .expect("done");

        let task = get_task(db.pool(), "t1").await.expect("get").expect("exists");
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.attempts, 1);
        assert_eq!(task.error.as_deref(), Some("boom"));
        assert!(!mark_running(db.pool(), "t1").await.expect("rerun refused"));
    }

    #[tokio::test]
    async fn test_revoked_task_stays_revoked() {
        let db = Database::in_memory().await.expect("create test database");
        insert_task(db.pool(), "t1", "primary", "{}").await.expect("insert");

        assert!(mark_revoked(db.pool(), "t1").await.expect("revoke"));
        assert!(!mark_running(db.pool(), "t1").await.expect("start refused"));
        mark_done(db.pool(), "t1", TaskStatus::Finished, None)
            .await
            .expect("done");

        let task = get_task(db.pool(), "t1").await.expect("get").expect("exists");
        assert_eq!(task.status, TaskStatus::Revoked);
        assert!(!mark_revoked(db.pool(), "t1").await.expect("second revoke"));
    }

    #[tokio::test]
    async fn test_unfinished_tasks_in_order() {
        let db = Database::in_memory().await.expect("create test database");
        for id in ["a", "b", "c", "d"] {
            insert_task(db.pool(), id, "primary", "{}").await.expect("insert");
        }
        mark_running(db.pool(), "b").await.expect("running");
        mark_done(db.pool(), "c", TaskStatus::Finished, None)
            .await
            .expect("done");
        mark_revoked(db.pool(), "d").await.expect("revoke");

        let ids: Vec<String> = list_unfinished(db.pool())
            .await
            .expect("list")
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
