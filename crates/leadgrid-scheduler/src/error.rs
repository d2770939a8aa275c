//! Scheduler error types.

use leadgrid_db::DatabaseError;
use thiserror::Error;

/// Errors raised while queueing or running tasks.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The task log could not be read or written.
    #[error("task store error: {0}")]
    Database(#[from] DatabaseError),

    /// A task payload could not be encoded or decoded.
    #[error("invalid task payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// No runner is attached to the queue.
    #[error("no task runner attached")]
    NoRunner,

    /// The task itself failed.
    #[error("task failed: {0}")]
    Task(String),
}

/// Result type alias for scheduler operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;
