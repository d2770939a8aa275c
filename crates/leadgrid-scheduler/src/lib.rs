//! LeadGrid Scheduler - dispatches units of work.
//!
//! A unit of work is one [`Task`]: a job layer run or a batch run. Tasks go
//! through a [`WorkQueue`] and are executed by a [`TaskRunner`]:
//!
//! - [`TokioQueue`] records each task in the database, runs it on the tokio
//!   runtime under a concurrency limit and soft/hard wall-clock limits, and
//!   re-enqueues unfinished tasks after a restart.
//! - [`InlineQueue`] runs tasks to completion inside `enqueue`, for tests.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod error;
pub mod inline;
pub mod queue;
pub mod task;
pub mod tokio_queue;

pub use error::{Result, SchedulerError};
pub use inline::InlineQueue;
pub use queue::{RunContext, TaskRunner, WorkQueue};
pub use task::{Task, TaskId};
pub use tokio_queue::{QueueLimits, TokioQueue};
