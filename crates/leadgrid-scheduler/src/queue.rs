//! Queue and runner seams.

use crate::error::Result;
use crate::task::{Task, TaskId};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Per-run context handed to the runner.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Identifier of the running task
    pub task_id: TaskId,
    /// Cancelled when the soft wall-clock limit passes
    pub soft_limit: CancellationToken,
}

impl RunContext {
    /// Context with a soft limit that never fires on its own.
    #[must_use]
    pub fn unlimited(task_id: TaskId) -> Self {
        Self {
            task_id,
            soft_limit: CancellationToken::new(),
        }
    }
}

/// Executes tasks.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// Run `task` to completion.
    ///
    /// Runners should stop cleanly once `ctx.soft_limit` is cancelled; the
    /// hard limit drops the future without warning.
    async fn run(&self, task: Task, ctx: RunContext) -> Result<()>;

    /// Called after the hard limit dropped a run of `task`.
    async fn abandoned(&self, _task: &Task, _reason: &str) {}
}

/// Accepts tasks for execution.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Submit a task and return its identifier.
    async fn enqueue(&self, task: Task) -> Result<TaskId>;

    /// Cancel a queued or running task. Returns `false` if it had already ended.
    async fn revoke(&self, id: &TaskId) -> Result<bool>;
}
