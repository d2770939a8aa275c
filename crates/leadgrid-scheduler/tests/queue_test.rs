//! Integration tests for `TokioQueue` against an in-memory task log.

use async_trait::async_trait;
use leadgrid_db::{tasks, Database, TaskStatus};
use leadgrid_scheduler::{
    QueueLimits, RunContext, SchedulerError, Task, TaskId, TaskRunner, TokioQueue, WorkQueue,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Behaviour {
    Succeed,
    Fail,
    WaitForSoftLimit,
    IgnoreLimits,
    WaitForRelease,
}

struct RecordingRunner {
    behaviour: Behaviour,
    started: Mutex<Vec<Task>>,
    abandoned: Mutex<Vec<String>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
    release: Notify,
}

impl RecordingRunner {
    fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            started: Mutex::new(Vec::new()),
            abandoned: Mutex::new(Vec::new()),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
            release: Notify::new(),
        })
    }

    fn started(&self) -> Vec<Task> {
        self.started.lock().expect("lock").clone()
    }
}

#[async_trait]
impl TaskRunner for RecordingRunner {
    async fn run(&self, task: Task, ctx: RunContext) -> leadgrid_scheduler::Result<()> {
        self.started.lock().expect("lock").push(task);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);

        let result = match self.behaviour {
            Behaviour::Succeed => {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(())
            }
            Behaviour::Fail => Err(SchedulerError::Task("collector exploded".to_string())),
            Behaviour::WaitForSoftLimit => {
                ctx.soft_limit.cancelled().await;
                Ok(())
            }
            Behaviour::IgnoreLimits => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }
            Behaviour::WaitForRelease => {
                self.release.notified().await;
                Ok(())
            }
        };

        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn abandoned(&self, task: &Task, reason: &str) {
        self.abandoned
            .lock()
            .expect("lock")
            .push(format!("{task}: {reason}"));
    }
}

fn limits(soft_ms: u64, hard_ms: u64) -> QueueLimits {
    QueueLimits {
        concurrency: 1,
        soft: Duration::from_millis(soft_ms),
        hard: Duration::from_millis(hard_ms),
    }
}

async fn wait_for_status(db: &Database, id: &TaskId, expected: TaskStatus) -> tasks::TaskRecord {
    for _ in 0..500 {
        let record = tasks::get_task(db.pool(), id.as_str())
            .await
            .expect("query task")
            .expect("task exists");
        if record.status == expected {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {id} never reached {expected:?}");
}

fn primary(job_id: &str) -> Task {
    Task::Primary {
        job_id: job_id.to_string(),
    }
}

#[tokio::test]
async fn test_runs_task_and_records_success() {
    let db = Database::in_memory().await.expect("database");
    let queue = TokioQueue::new(db.clone(), limits(5_000, 10_000));
    let runner = RecordingRunner::new(Behaviour::Succeed);
    queue.attach(&runner);

    let id = queue.enqueue(primary("job-1")).await.expect("enqueue");
    let record = wait_for_status(&db, &id, TaskStatus::Finished).await;

    assert_eq!(record.kind, "primary");
    assert_eq!(record.attempts, 1);
    assert_eq!(runner.started(), vec![primary("job-1")]);
}

#[tokio::test]
async fn test_failure_is_recorded_with_error_text() {
    let db = Database::in_memory().await.expect("database");
    let queue = TokioQueue::new(db.clone(), limits(5_000, 10_000));
    let runner = RecordingRunner::new(Behaviour::Fail);
    queue.attach(&runner);

    let id = queue.enqueue(primary("job-1")).await.expect("enqueue");
    let record = wait_for_status(&db, &id, TaskStatus::Failed).await;
    assert!(record
        .error
        .expect("error text")
        .contains("collector exploded"));
}

#[tokio::test]
async fn test_concurrency_limit_serializes_runs() {
    let db = Database::in_memory().await.expect("database");
    let queue = TokioQueue::new(db.clone(), limits(5_000, 10_000));
    let runner = RecordingRunner::new(Behaviour::Succeed);
    queue.attach(&runner);

    let mut ids = Vec::new();
    for n in 0..3 {
        ids.push(queue.enqueue(primary(&format!("job-{n}"))).await.expect("enqueue"));
    }
    for id in &ids {
        wait_for_status(&db, id, TaskStatus::Finished).await;
    }

    assert_eq!(runner.max_running.load(Ordering::SeqCst), 1);
    assert_eq!(runner.started().len(), 3);
}

#[tokio::test]
async fn test_soft_limit_cancels_the_token() {
    let db = Database::in_memory().await.expect("database");
    let queue = TokioQueue::new(db.clone(), limits(50, 10_000));
    let runner = RecordingRunner::new(Behaviour::WaitForSoftLimit);
    queue.attach(&runner);

    let id = queue.enqueue(primary("job-1")).await.expect("enqueue");
    wait_for_status(&db, &id, TaskStatus::Finished).await;
    assert!(runner.abandoned.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn test_hard_limit_drops_the_run() {
    let db = Database::in_memory().await.expect("database");
    let queue = TokioQueue::new(db.clone(), limits(50, 150));
    let runner = RecordingRunner::new(Behaviour::IgnoreLimits);
    queue.attach(&runner);

    let id = queue.enqueue(primary("job-1")).await.expect("enqueue");
    let record = wait_for_status(&db, &id, TaskStatus::Failed).await;

    assert!(record.error.expect("error text").contains("hard time limit"));
    let abandoned = runner.abandoned.lock().expect("lock").clone();
    assert_eq!(abandoned.len(), 1);
    assert!(abandoned[0].starts_with("primary job-1"));
}

#[tokio::test]
async fn test_revoked_task_never_starts() {
    let db = Database::in_memory().await.expect("database");
    let queue = TokioQueue::new(db.clone(), limits(5_000, 10_000));
    let runner = RecordingRunner::new(Behaviour::WaitForRelease);
    queue.attach(&runner);

    let first = queue.enqueue(primary("job-1")).await.expect("enqueue");
    let second = queue.enqueue(primary("job-2")).await.expect("enqueue");
    wait_for_status(&db, &first, TaskStatus::Running).await;

    assert!(queue.revoke(&second).await.expect("revoke"));
    runner.release.notify_one();
    wait_for_status(&db, &first, TaskStatus::Finished).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(runner.started(), vec![primary("job-1")]);
    let record = wait_for_status(&db, &second, TaskStatus::Revoked).await;
    assert_eq!(record.attempts, 0);
    assert!(!queue.revoke(&second).await.expect("second revoke"));
}

#[tokio::test]
async fn test_recover_resumes_unfinished_tasks() {
    let db = Database::in_memory().await.expect("database");
    let payload = serde_json::to_string(&Task::Enrichment {
        job_id: "job-9".to_string(),
    })
    .expect("payload");
    tasks::insert_task(db.pool(), "left-over", "enrichment", &payload)
        .await
        .expect("insert");
    tasks::mark_running(db.pool(), "left-over").await.expect("running");
    tasks::insert_task(db.pool(), "garbage", "primary", "not json")
        .await
        .expect("insert");

    let queue = TokioQueue::new(db.clone(), limits(5_000, 10_000));
    let runner = RecordingRunner::new(Behaviour::Succeed);
    queue.attach(&runner);

    assert_eq!(queue.recover().await.expect("recover"), 1);
    let record = wait_for_status(&db, &TaskId::from("left-over"), TaskStatus::Finished).await;
    assert_eq!(record.attempts, 2);
    wait_for_status(&db, &TaskId::from("garbage"), TaskStatus::Failed).await;
    assert_eq!(
        runner.started(),
        vec![Task::Enrichment {
            job_id: "job-9".to_string()
        }]
    );
}

#[tokio::test]
async fn test_enqueue_without_runner_is_refused() {
    let db = Database::in_memory().await.expect("database");
    let queue = TokioQueue::new(db, limits(5_000, 10_000));
    assert!(matches!(
        queue.enqueue(primary("job-1")).await,
        Err(SchedulerError::NoRunner)
    ));
}
