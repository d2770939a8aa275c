//! Database-backed queue running tasks on the tokio runtime.

use crate::error::{Result, SchedulerError};
use crate::queue::{RunContext, TaskRunner, WorkQueue};
use crate::task::{Task, TaskId};
use async_trait::async_trait;
use leadgrid_core::{LimitsConfig, WorkerConfig};
use leadgrid_db::{tasks, Database, TaskStatus};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

/// Concurrency and wall-clock limits for each task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueLimits {
    /// Tasks allowed to run at once
    pub concurrency: usize,
    /// After this long the runner is asked to stop
    pub soft: Duration,
    /// After this long the run is dropped
    pub hard: Duration,
}

impl QueueLimits {
    /// Limits from configuration.
    #[must_use]
    pub fn from_config(limits: &LimitsConfig, worker: &WorkerConfig) -> Self {
        Self {
            concurrency: worker.concurrency.max(1),
            soft: Duration::from_secs(limits.soft_time_limit_secs),
            hard: Duration::from_secs(limits.hard_time_limit_secs),
        }
    }
}

impl Default for QueueLimits {
    fn default() -> Self {
        Self::from_config(&LimitsConfig::default(), &WorkerConfig::default())
    }
}

type Handles = Arc<Mutex<HashMap<TaskId, AbortHandle>>>;

/// Production queue.
///
/// Every task is written to the `tasks` table before it is spawned, so
/// [`TokioQueue::recover`] can pick up work interrupted by a crash. A
/// semaphore bounds concurrent runs; the default of one keeps a single
/// browser alive at a time.
pub struct TokioQueue {
    db: Database,
    limits: QueueLimits,
    permits: Arc<Semaphore>,
    handles: Handles,
    runner: OnceLock<Weak<dyn TaskRunner>>,
}

impl TokioQueue {
    /// Create a queue. Attach a runner before enqueueing.
    #[must_use]
    pub fn new(db: Database, limits: QueueLimits) -> Self {
        Self {
            db,
            permits: Arc::new(Semaphore::new(limits.concurrency.max(1))),
            limits,
            handles: Arc::new(Mutex::new(HashMap::new())),
            runner: OnceLock::new(),
        }
    }

    /// Attach the runner. The queue holds it weakly; only the first call counts.
    pub fn attach<R: TaskRunner + 'static>(&self, runner: &Arc<R>) {
        let runner: Arc<dyn TaskRunner> = runner.clone();
        if self.runner.set(Arc::downgrade(&runner)).is_err() {
            tracing::warn!("Task runner already attached, ignoring");
        }
    }

    fn runner(&self) -> Result<Arc<dyn TaskRunner>> {
        self.runner
            .get()
            .and_then(Weak::upgrade)
            .ok_or(SchedulerError::NoRunner)
    }

    /// Number of tasks spawned and not yet ended.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Re-enqueue tasks left queued or running by a previous process.
    ///
    /// Returns how many were resumed. Unreadable payloads are marked failed.
    pub async fn recover(&self) -> Result<usize> {
        let pending = tasks::list_unfinished(self.db.pool()).await?;
        let mut resumed = 0;

        for record in pending {
            match Task::from_payload(&record.payload) {
                Ok(task) => {
                    tracing::info!(
                        "Recovering task {} ({}, {} previous attempts)",
                        record.id,
                        task,
                        record.attempts
                    );
                    self.spawn(TaskId::from(record.id), task)?;
                    resumed += 1;
                }
                Err(e) => {
                    tracing::error!("Dropping unreadable task {}: {}", record.id, e);
                    tasks::mark_done(
                        self.db.pool(),
                        &record.id,
                        TaskStatus::Failed,
                        Some(&format!("unreadable payload: {e}")),
                    )
                    .await?;
                }
            }
        }

        Ok(resumed)
    }

    fn spawn(&self, id: TaskId, task: Task) -> Result<()> {
        let runner = self.runner()?;
        let db = self.db.clone();
        let permits = Arc::clone(&self.permits);
        let handles = Arc::clone(&self.handles);
        let limits = self.limits;

        let mut guard = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        let task_id = id.clone();
        let handle = tokio::spawn(async move {
            execute(&db, &permits, runner.as_ref(), limits, task_id.clone(), task).await;
            handles
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&task_id);
        });
        guard.insert(id, handle.abort_handle());
        Ok(())
    }
}

async fn execute(
    db: &Database,
    permits: &Semaphore,
    runner: &dyn TaskRunner,
    limits: QueueLimits,
    id: TaskId,
    task: Task,
) {
    let Ok(_permit) = permits.acquire().await else {
        tracing::error!("Queue closed before task {} could start", id);
        return;
    };

    match tasks::mark_running(db.pool(), id.as_str()).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::info!("Task {} was revoked before starting", id);
            return;
        }
        Err(e) => {
            tracing::error!("Failed to mark task {} running: {}", id, e);
            return;
        }
    }

    tracing::info!("Starting task {} ({})", id, task);
    let soft_limit = CancellationToken::new();
    let ctx = RunContext {
        task_id: id.clone(),
        soft_limit: soft_limit.clone(),
    };

    let run = runner.run(task.clone(), ctx);
    tokio::pin!(run);
    let soft_deadline = tokio::time::sleep(limits.soft);
    tokio::pin!(soft_deadline);

    let outcome = tokio::time::timeout(limits.hard, async {
        tokio::select! {
            result = &mut run => return result,
            () = &mut soft_deadline => {
                tracing::warn!("Task {} reached its soft time limit", id);
                soft_limit.cancel();
            }
        }
        run.await
    })
    .await;

    let (status, error) = match outcome {
        Ok(Ok(())) => (TaskStatus::Finished, None),
        Ok(Err(e)) => {
            tracing::error!("Task {} failed: {}", id, e);
            (TaskStatus::Failed, Some(e.to_string()))
        }
        Err(_) => {
            let reason = format!("hard time limit of {:?} exceeded", limits.hard);
            tracing::error!("Task {} aborted: {}", id, reason);
            runner.abandoned(&task, &reason).await;
            (TaskStatus::Failed, Some(reason))
        }
    };

    if let Err(e) = tasks::mark_done(db.pool(), id.as_str(), status, error.as_deref()).await {
        tracing::error!("Failed to record end of task {}: {}", id, e);
    }
}

#[async_trait]
impl WorkQueue for TokioQueue {
    async fn enqueue(&self, task: Task) -> Result<TaskId> {
        self.runner()?;
        let id = TaskId::generate();
        let payload = task.to_payload()?;
        tasks::insert_task(self.db.pool(), id.as_str(), task.kind(), &payload).await?;

        tracing::debug!("Enqueued task {} ({})", id, task);
        self.spawn(id.clone(), task)?;
        Ok(id)
    }

    async fn revoke(&self, id: &TaskId) -> Result<bool> {
        let revoked = tasks::mark_revoked(self.db.pool(), id.as_str()).await?;
        let handle = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        if let Some(handle) = handle {
            handle.abort();
        }
        if revoked {
            tracing::info!("Revoked task {}", id);
        }
        Ok(revoked)
    }
}
