//! Synchronous queue for tests.

use crate::error::{Result, SchedulerError};
use crate::queue::{RunContext, TaskRunner, WorkQueue};
use crate::task::{Task, TaskId};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};

/// Runs each task to completion inside [`WorkQueue::enqueue`].
///
/// Without an attached runner tasks are only recorded, which lets tests
/// assert on what would have been scheduled.
#[derive(Default)]
pub struct InlineQueue {
    runner: OnceLock<Weak<dyn TaskRunner>>,
    enqueued: Mutex<Vec<Task>>,
}

impl InlineQueue {
    /// Create a queue with no runner attached.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the runner that executes enqueued tasks.
    pub fn attach<R: TaskRunner + 'static>(&self, runner: &Arc<R>) {
        let runner: Arc<dyn TaskRunner> = runner.clone();
        let _ = self.runner.set(Arc::downgrade(&runner));
    }

    /// Every task enqueued so far, in order.
    #[must_use]
    pub fn enqueued(&self) -> Vec<Task> {
        self.enqueued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl WorkQueue for InlineQueue {
    async fn enqueue(&self, task: Task) -> Result<TaskId> {
        let id = TaskId::generate();
        self.enqueued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(task.clone());

        let Some(slot) = self.runner.get() else {
            return Ok(id);
        };
        let runner = slot.upgrade().ok_or(SchedulerError::NoRunner)?;
        runner.run(task, RunContext::unlimited(id.clone())).await?;
        Ok(id)
    }

    async fn revoke(&self, _id: &TaskId) -> Result<bool> {
        Ok(false)
    }
}
