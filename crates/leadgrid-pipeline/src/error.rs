//! Error types for the orchestrator.

use leadgrid_core::GeoError;
use leadgrid_db::{DatabaseError, JobStatus, Layer};
use leadgrid_providers::ProviderError;
use leadgrid_scheduler::SchedulerError;
use thiserror::Error;

/// Errors raised while creating, triggering or running jobs.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Request rejected before any collection started
    #[error("invalid request: {0}")]
    Validation(String),

    /// The layer is already queued or running for this job
    #[error("{layer} layer is already queued or running for job {job_id}")]
    LayerBusy {
        /// Target job
        job_id: String,
        /// Requested layer
        layer: Layer,
    },

    /// Secondary layers need a completed primary layer
    #[error("primary layer has not completed for job {job_id}")]
    PrimaryNotCompleted {
        /// Target job
        job_id: String,
    },

    /// Cancelled jobs accept no further work
    #[error("job {0} is cancelled")]
    JobCancelled(String),

    /// The job already reached a terminal status
    #[error("job {job_id} already {status}")]
    AlreadyFinished {
        /// Target job
        job_id: String,
        /// Its terminal status
        status: JobStatus,
    },

    /// A notification could not be delivered
    #[error("notification failed: {0}")]
    Notify(String),

    /// Grid could not be generated
    #[error("grid error: {0}")]
    Geo(#[from] GeoError),

    /// Geocoding or another integration failed hard
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Persistence failure
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// Queue failure
    #[error("queue error: {0}")]
    Scheduler(#[from] SchedulerError),
}

/// Result type alias using `PipelineError`.
pub type Result<T> = std::result::Result<T, PipelineError>;

impl From<PipelineError> for SchedulerError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Database(e) => Self::Database(e),
            PipelineError::Scheduler(e) => e,
            other => Self::Task(other.to_string()),
        }
    }
}
