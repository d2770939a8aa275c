//! Job creation, layer triggers and cancellation.

use crate::error::{PipelineError, Result};
use crate::notify::{notify_detached, Notification, Notifier, TracingNotifier};
use crate::sources::{ContactSource, EnrichmentSource, PrimarySource, SupplementarySource};
use crate::status::{derive_status, MAX_GRID_CELLS};
use async_trait::async_trait;
use leadgrid_core::{generate_grid, AppConfig, Coordinates, Lead};
use leadgrid_db::{
    batches, jobs, leads, tasks, truncate_error, Batch, BatchStatus, Database, Job, JobStatus, Layer,
    LayerState, LocationType, NewJob,
};
use leadgrid_providers::Geocoder;
use leadgrid_scheduler::{RunContext, Task, TaskId, TaskRunner, WorkQueue};
use std::sync::Arc;

/// A request to collect leads for one keyword and area.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    /// Search keyword, e.g. `coffee`
    pub keyword: String,
    /// Free-text location; required for address jobs
    pub location: Option<String>,
    /// How the location is given
    pub location_type: LocationType,
    /// Search center; required for coordinate jobs
    pub coordinates: Option<Coordinates>,
    /// Search radius in kilometres
    pub radius_km: f64,
}

impl JobRequest {
    /// Request for an address to be geocoded.
    #[must_use]
    pub fn address(keyword: &str, location: &str, radius_km: f64) -> Self {
        Self {
            keyword: keyword.to_string(),
            location: Some(location.to_string()),
            location_type: LocationType::Address,
            coordinates: None,
            radius_km,
        }
    }

    /// Request around known coordinates.
    #[must_use]
    pub fn coordinates(keyword: &str, center: Coordinates, radius_km: f64) -> Self {
        Self {
            keyword: keyword.to_string(),
            location: None,
            location_type: LocationType::Coordinates,
            coordinates: Some(center),
            radius_km,
        }
    }
}

/// Tunables the layer runs read from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Grid cell overlap, 0.0-0.5
    pub overlap_factor: f64,
    /// Listings kept per primary cell
    pub max_results: usize,
    /// Map zoom used for supplementary searches
    pub zoom: u8,
    /// Whether the enrichment layer scans business websites
    pub website_lookups: bool,
    /// Website scans per enrichment run
    pub max_website_lookups: usize,
}

impl PipelineSettings {
    /// Settings from the application configuration.
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            overlap_factor: config.grid.overlap_factor,
            max_results: config.collector.max_results,
            zoom: config.collector.zoom,
            website_lookups: config.enrichment.website_lookups,
            max_website_lookups: config.enrichment.max_website_lookups,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// The collectors a pipeline drives.
///
/// Supplementary and enrichment sources are optional; a missing source
/// makes its layer complete without doing anything.
#[derive(Clone)]
pub struct Sources {
    /// Browser-driven collector
    pub primary: Arc<dyn PrimarySource>,
    /// Search-results API
    pub supplementary: Option<Arc<dyn SupplementarySource>>,
    /// Contact enrichment API
    pub enrichment: Option<Arc<dyn EnrichmentSource>>,
    /// Website contact scanner
    pub contacts: Option<Arc<dyn ContactSource>>,
    /// Address resolution
    pub geocoder: Arc<dyn Geocoder>,
}

/// Orchestrates jobs, their three layers and batches.
///
/// Work is handed to a [`WorkQueue`]; the queue calls back into the
/// pipeline through its [`TaskRunner`] implementation, so a pipeline is
/// normally held in an `Arc` and attached to its queue.
pub struct Pipeline {
    pub(crate) db: Database,
    pub(crate) queue: Arc<dyn WorkQueue>,
    pub(crate) sources: Sources,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) settings: PipelineSettings,
}

impl Pipeline {
    /// Create a pipeline that logs its notifications.
    #[must_use]
    pub fn new(
        db: Database,
        queue: Arc<dyn WorkQueue>,
        sources: Sources,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            db,
            queue,
            sources,
            notifier: Arc::new(TracingNotifier),
            settings,
        }
    }

    /// Replace the notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Database handle.
    #[must_use]
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Fetch a job.
    pub async fn job(&self, job_id: &str) -> Result<Job> {
        Ok(jobs::require_job(self.db.pool(), job_id).await?)
    }

    /// Stored leads of a job, in checkpoint order.
    pub async fn leads(&self, job_id: &str) -> Result<Vec<Lead>> {
        Ok(leads::list_leads(self.db.pool(), job_id).await?)
    }

    /// Fetch a batch.
    pub async fn batch(&self, batch_id: &str) -> Result<Batch> {
        Ok(batches::require_batch(self.db.pool(), batch_id).await?)
    }

    /// Reject requests no collection should start for.
    ///
    /// Without coordinates the grid size is estimated at the equator.
    pub fn validate(&self, request: &JobRequest) -> Result<()> {
        if request.keyword.trim().is_empty() {
            return Err(PipelineError::Validation("keyword must not be empty".to_string()));
        }
        if !request.radius_km.is_finite() || request.radius_km <= 0.0 {
            return Err(PipelineError::Validation(format!(
                "radius must be positive, got {}",
                request.radius_km
            )));
        }
        match request.location_type {
            LocationType::Coordinates if request.coordinates.is_none() => {
                return Err(PipelineError::Validation(
                    "coordinates are required for a coordinates request".to_string(),
                ));
            }
            LocationType::Address
                if request.coordinates.is_none()
                    && request
                        .location
                        .as_deref()
                        .map_or(true, |l| l.trim().is_empty()) =>
            {
                return Err(PipelineError::Validation(
                    "location is required for an address request".to_string(),
                ));
            }
            _ => {}
        }

        let center = request
            .coordinates
            .unwrap_or_else(|| Coordinates::new(0.0, 0.0));
        let cells = generate_grid(center, request.radius_km, self.settings.overlap_factor)?.len();
        if cells > MAX_GRID_CELLS {
            return Err(PipelineError::Validation(format!(
                "radius {} km needs {} grid cells, the limit is {}",
                request.radius_km, cells, MAX_GRID_CELLS
            )));
        }
        Ok(())
    }

    fn new_job(request: &JobRequest, batch_id: Option<&str>) -> NewJob {
        NewJob {
            keyword: request.keyword.trim().to_string(),
            location: request
                .location
                .as_deref()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(ToString::to_string),
            location_type: request.location_type,
            coordinates: request.coordinates,
            radius_km: request.radius_km,
            batch_id: batch_id.map(ToString::to_string),
        }
    }

    /// Validate, store and enqueue a job's primary layer.
    pub async fn create_job(&self, request: &JobRequest) -> Result<Job> {
        self.validate(request)?;
        let job = jobs::create_job(self.db.pool(), &Self::new_job(request, None)).await?;
        tracing::info!(
            "Created job {} for '{}' ({} km)",
            job.id,
            job.keyword,
            job.radius_km
        );

        let task_id = self
            .queue
            .enqueue(Task::Primary {
                job_id: job.id.clone(),
            })
            .await?;
        jobs::set_task_id(self.db.pool(), &job.id, Some(task_id.as_str())).await?;
        self.job(&job.id).await
    }

    /// Store a batch of jobs and enqueue one task running them in order.
    ///
    /// Every request is validated before anything is stored.
    pub async fn create_batch(
        &self,
        name: &str,
        notify_email: Option<&str>,
        requests: &[JobRequest],
    ) -> Result<Batch> {
        if requests.is_empty() {
            return Err(PipelineError::Validation("batch has no jobs".to_string()));
        }
        for (index, request) in requests.iter().enumerate() {
            self.validate(request).map_err(|e| match e {
                PipelineError::Validation(reason) => {
                    PipelineError::Validation(format!("job {}: {reason}", index + 1))
                }
                other => other,
            })?;
        }

        let total = u32::try_from(requests.len()).unwrap_or(u32::MAX);
        let batch = batches::create_batch(self.db.pool(), name, notify_email, total).await?;
        for request in requests {
            jobs::create_job(self.db.pool(), &Self::new_job(request, Some(&batch.id))).await?;
        }
        tracing::info!("Created batch {} ('{}') with {} jobs", batch.id, name, total);

        let task_id = self
            .queue
            .enqueue(Task::Batch {
                batch_id: batch.id.clone(),
            })
            .await?;
        batches::set_task_id(self.db.pool(), &batch.id, Some(task_id.as_str())).await?;
        self.batch(&batch.id).await
    }

    /// Whether an unfinished stored task already covers `layer` of `job`.
    ///
    /// A batch task covers the primary layer of each of its jobs.
    async fn layer_queued(&self, job: &Job, layer: Layer) -> Result<bool> {
        let pending = tasks::list_unfinished(self.db.pool()).await?;
        Ok(pending
            .iter()
            .filter_map(|record| Task::from_payload(&record.payload).ok())
            .any(|task| match task {
                Task::Primary { job_id } => layer == Layer::Playwright && job_id == job.id,
                Task::Supplementary { job_id, .. } => layer == Layer::SerpApi && job_id == job.id,
                Task::Enrichment { job_id } => layer == Layer::Enrichment && job_id == job.id,
                Task::Batch { batch_id } => {
                    layer == Layer::Playwright
                        && job.batch_id.as_deref() == Some(batch_id.as_str())
                }
            }))
    }

    /// Enqueue a run of one layer.
    ///
    /// Refused while that layer is queued or running, for a cancelled job,
    /// and for the secondary layers until the primary layer has completed.
    pub async fn trigger_layer(
        &self,
        job_id: &str,
        layer: Layer,
        override_quota: bool,
    ) -> Result<TaskId> {
        let job = self.job(job_id).await?;
        if job.status == JobStatus::Cancelled {
            return Err(PipelineError::JobCancelled(job.id));
        }
        if job.layer(layer).state == LayerState::Running
            || self.layer_queued(&job, layer).await?
        {
            return Err(PipelineError::LayerBusy {
                job_id: job.id,
                layer,
            });
        }
        if layer != Layer::Playwright && job.playwright.state != LayerState::Completed {
            return Err(PipelineError::PrimaryNotCompleted { job_id: job.id });
        }

        let job_id = job.id.clone();
        let task = match layer {
            Layer::Playwright => Task::Primary { job_id },
            Layer::SerpApi => Task::Supplementary {
                job_id,
                override_quota,
            },
            Layer::Enrichment => Task::Enrichment { job_id },
        };
        let task_id = self.queue.enqueue(task).await?;
        jobs::set_task_id(self.db.pool(), &job.id, Some(task_id.as_str())).await?;
        tracing::info!("Triggered {} layer for job {} as task {}", layer, job.id, task_id);
        Ok(task_id)
    }

    /// Cancel a job.
    ///
    /// Its task is revoked and running layers are marked failed. Leads
    /// already checkpointed are kept.
    pub async fn cancel(&self, job_id: &str) -> Result<Job> {
        let job = self.job(job_id).await?;
        if job.status.is_terminal() {
            return Err(PipelineError::AlreadyFinished {
                job_id: job.id,
                status: job.status,
            });
        }

        if let Some(task_id) = job.task_id.as_deref() {
            match self.queue.revoke(&TaskId::from(task_id)).await {
                Ok(true) => tracing::debug!("Revoked task {} of job {}", task_id, job.id),
                Ok(false) => {}
                Err(e) => tracing::warn!("Failed to revoke task {}: {}", task_id, e),
            }
        }

        let pool = self.db.pool();
        for layer in Layer::ALL {
            if job.layer(layer).state == LayerState::Running {
                jobs::set_layer_state(pool, &job.id, layer, LayerState::Failed).await?;
            }
        }
        jobs::set_error(pool, &job.id, Some("cancelled")).await?;
        jobs::update_status(pool, &job.id, JobStatus::Cancelled, Some("Cancelled")).await?;
        tracing::info!("Cancelled job {}", job.id);
        self.job(&job.id).await
    }

    /// Recompute and store the overall status from the layer states.
    pub(crate) async fn refresh_status(&self, job_id: &str) -> Result<JobStatus> {
        let job = self.job(job_id).await?;
        let status = derive_status(&job);
        if status != job.status {
            let pool = self.db.pool();
            match status {
                JobStatus::Completed => {
                    jobs::update_status(pool, job_id, status, None).await?;
                    jobs::update_progress(pool, job_id, 100, "Completed").await?;
                }
                JobStatus::Failed => {
                    jobs::update_status(pool, job_id, status, Some("Failed")).await?;
                }
                _ => jobs::update_status(pool, job_id, status, None).await?,
            }
            tracing::debug!("Job {} status {} -> {}", job_id, job.status, status);
        }
        Ok(status)
    }

    /// Mark `layer` failed with `error`, recompute the status and notify.
    pub(crate) async fn fail_layer(&self, job: &Job, layer: Layer, error: &str) -> Result<()> {
        let message = truncate_error(error);
        let pool = self.db.pool();
        jobs::set_layer_state(pool, &job.id, layer, LayerState::Failed).await?;
        jobs::set_error(pool, &job.id, Some(&message)).await?;
        self.refresh_status(&job.id).await?;

        notify_detached(
            &self.notifier,
            Notification::LayerFailed {
                job_id: job.id.clone(),
                keyword: job.keyword.clone(),
                location: job.location.clone(),
                layer,
                error: message,
            },
        );
        Ok(())
    }

    /// Run one layer of a job and record how it ended.
    ///
    /// Failures inside the layer are recorded on the job rather than
    /// returned; the returned state is the layer's final state. A job
    /// cancelled before or during the run is left as it is.
    pub async fn run_layer(
        &self,
        job_id: &str,
        layer: Layer,
        override_quota: bool,
        ctx: &RunContext,
    ) -> Result<LayerState> {
        let pool = self.db.pool();
        let job = self.job(job_id).await?;
        if job.status == JobStatus::Cancelled {
            tracing::info!("Job {} is cancelled, skipping {} layer", job.id, layer);
            return Ok(job.layer(layer).state);
        }

        jobs::set_layer_state(pool, &job.id, layer, LayerState::Running).await?;
        if layer == Layer::Playwright {
            jobs::set_partial_reason(pool, &job.id, None).await?;
        }
        self.refresh_status(&job.id).await?;
        tracing::info!("Starting {} layer for job {}", layer, job.id);

        let result = match layer {
            Layer::Playwright => self.run_primary(&job, ctx).await,
            Layer::SerpApi => self.run_supplementary(&job, override_quota, ctx).await,
            Layer::Enrichment => self.run_enrichment(&job, ctx).await,
        };

        let current = self.job(&job.id).await?;
        if current.status == JobStatus::Cancelled {
            tracing::info!("Job {} was cancelled during its {} layer", job.id, layer);
            return Ok(current.layer(layer).state);
        }

        match result {
            Ok(()) => {
                jobs::set_layer_state(pool, &job.id, layer, LayerState::Completed).await?;
                self.refresh_status(&job.id).await?;
                tracing::info!("{} layer completed for job {}", layer, job.id);
                Ok(LayerState::Completed)
            }
            Err(e) => {
                tracing::error!("{} layer failed for job {}: {}", layer, job.id, e);
                self.fail_layer(&current, layer, &e.to_string()).await?;
                Ok(LayerState::Failed)
            }
        }
    }

    /// Mark every running layer of `job_id` failed with `reason`.
    async fn fail_running_layers(&self, job_id: &str, reason: &str) -> Result<()> {
        let job = self.job(job_id).await?;
        for layer in Layer::ALL {
            if job.layer(layer).state == LayerState::Running {
                self.fail_layer(&job, layer, reason).await?;
            }
        }
        Ok(())
    }

    async fn abandon_batch(&self, batch_id: &str, reason: &str) -> Result<()> {
        for job in jobs::list_batch_jobs(self.db.pool(), batch_id).await? {
            self.fail_running_layers(&job.id, reason).await?;
        }
        let batch = self.batch(batch_id).await?;
        let unfinished = batch
            .total_jobs
            .saturating_sub(batch.completed_jobs + batch.failed_jobs);
        let status = BatchStatus::from_counts(batch.completed_jobs, batch.failed_jobs + unfinished);
        batches::update_status(self.db.pool(), batch_id, status).await?;
        Ok(())
    }
}

#[async_trait]
impl TaskRunner for Pipeline {
    async fn run(&self, task: Task, ctx: RunContext) -> leadgrid_scheduler::Result<()> {
        match task {
            Task::Primary { job_id } => {
                self.run_layer(&job_id, Layer::Playwright, false, &ctx).await?;
            }
            Task::Supplementary {
                job_id,
                override_quota,
            } => {
                self.run_layer(&job_id, Layer::SerpApi, override_quota, &ctx)
                    .await?;
            }
            Task::Enrichment { job_id } => {
                self.run_layer(&job_id, Layer::Enrichment, false, &ctx).await?;
            }
            Task::Batch { batch_id } => {
                self.run_batch(&batch_id, &ctx).await?;
            }
        }
        Ok(())
    }

    async fn abandoned(&self, task: &Task, reason: &str) {
        let result = match task {
            Task::Batch { batch_id } => self.abandon_batch(batch_id, reason).await,
            _ => match task.job_id() {
                Some(job_id) => self.fail_running_layers(job_id, reason).await,
                None => Ok(()),
            },
        };
        if let Err(e) = result {
            tracing::error!("Failed to record abandoned task {}: {}", task, e);
        }
    }
}
