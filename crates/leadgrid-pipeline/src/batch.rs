//! Batch runner.

use crate::error::Result;
use crate::notify::{notify_detached, Notification};
use crate::pipeline::Pipeline;
use leadgrid_db::{batches, jobs, BatchStatus, Layer, LayerState};
use leadgrid_scheduler::RunContext;

impl Pipeline {
    /// Run the primary layer of every member job, in creation order.
    ///
    /// A failed job is counted and the batch moves on. Once the soft limit
    /// fires, the jobs not yet started are failed without running.
    pub async fn run_batch(&self, batch_id: &str, ctx: &RunContext) -> Result<BatchStatus> {
        let pool = self.db.pool();
        let batch = self.batch(batch_id).await?;
        batches::update_status(pool, batch_id, BatchStatus::Running).await?;

        let members = jobs::list_batch_jobs(pool, batch_id).await?;
        tracing::info!(
            "Running batch {} ('{}'): {} jobs",
            batch.id,
            batch.name,
            members.len()
        );

        for (index, job) in members.iter().enumerate() {
            let succeeded = if ctx.soft_limit.is_cancelled() {
                self.fail_layer(job, Layer::Playwright, "batch stopped at soft time limit")
                    .await?;
                false
            } else {
                tracing::info!(
                    "Batch {}: job {}/{} ({})",
                    batch_id,
                    index + 1,
                    members.len(),
                    job.id
                );
                match self.run_layer(&job.id, Layer::Playwright, false, ctx).await {
                    Ok(state) => state == LayerState::Completed,
                    Err(e) => {
                        tracing::error!("Batch {}: job {} failed: {}", batch_id, job.id, e);
                        false
                    }
                }
            };
            batches::record_job_result(pool, batch_id, succeeded).await?;
        }

        let batch = self.batch(batch_id).await?;
        let status = BatchStatus::from_counts(batch.completed_jobs, batch.failed_jobs);
        batches::update_status(pool, batch_id, status).await?;
        tracing::info!(
            "Batch {} {}: {} completed, {} failed",
            batch_id,
            status,
            batch.completed_jobs,
            batch.failed_jobs
        );

        notify_detached(
            &self.notifier,
            Notification::BatchFinished {
                batch_id: batch.id,
                name: batch.name,
                notify_email: batch.notify_email,
                status,
                total_jobs: batch.total_jobs,
                completed_jobs: batch.completed_jobs,
                failed_jobs: batch.failed_jobs,
            },
        );
        Ok(status)
    }
}
