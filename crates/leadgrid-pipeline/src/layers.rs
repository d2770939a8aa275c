//! Bodies of the three layer runs.
//!
//! Each run reads the job's stored leads, collects, merges and replaces
//! them. The primary and supplementary runs checkpoint after every cell, so
//! a crash or timeout loses at most one cell of work.

use crate::error::{PipelineError, Result};
use crate::pipeline::Pipeline;
use crate::status::{detail_budget, primary_progress, MAX_GRID_CELLS};
use leadgrid_core::{generate_grid, Coordinates, GridPoint, Lead};
use leadgrid_db::{jobs, leads, Job, JobStatus, Layer};
use leadgrid_providers::SerpQuery;
use leadgrid_scanner::CellRequest;
use leadgrid_scheduler::RunContext;

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

impl Pipeline {
    /// Merge `incoming` into the stored leads of `job_id` and store the result.
    ///
    /// Stored leads go first so the merge is repeatable. Returns the number
    /// of leads stored.
    pub(crate) async fn checkpoint(&self, job_id: &str, incoming: Vec<Lead>) -> Result<u32> {
        let pool = self.db.pool();
        let mut records = leads::list_leads(pool, job_id).await?;
        records.extend(incoming);
        let merged = leadgrid_dedup::merge(records);
        let stored = leads::replace_leads(pool, job_id, &merged).await?;
        Ok(count(stored))
    }

    /// Whether the job was cancelled while one of its layers ran.
    async fn is_cancelled(&self, job_id: &str) -> Result<bool> {
        Ok(self.job(job_id).await?.status == JobStatus::Cancelled)
    }

    fn grid_for(&self, center: Coordinates, radius_km: f64) -> Result<Vec<GridPoint>> {
        let grid = generate_grid(center, radius_km, self.settings.overlap_factor)?;
        if grid.len() > MAX_GRID_CELLS {
            return Err(PipelineError::Validation(format!(
                "grid of {} cells exceeds the {} cell limit",
                grid.len(),
                MAX_GRID_CELLS
            )));
        }
        Ok(grid)
    }

    /// Resolve the search center, geocoding address jobs.
    ///
    /// Coordinate jobs without a location text get a reverse-geocoded label;
    /// a failed reverse lookup is ignored.
    async fn resolve_center(&self, job: &Job) -> Result<(Coordinates, String)> {
        let pool = self.db.pool();
        let location = job.location.clone().unwrap_or_default();

        if let Some(center) = job.coordinates {
            if job.location.is_some() {
                return Ok((center, location));
            }
            return match self.sources.geocoder.reverse(center).await {
                Ok(label) => {
                    jobs::set_location(pool, &job.id, center, Some(&label)).await?;
                    Ok((center, label))
                }
                Err(e) => {
                    tracing::debug!("Reverse geocoding failed for job {}: {}", job.id, e);
                    Ok((center, location))
                }
            };
        }

        jobs::update_status(pool, &job.id, JobStatus::Geocoding, Some("Geocoding location"))
            .await?;
        jobs::update_progress(pool, &job.id, 5, "Geocoding location").await?;
        let center = self.sources.geocoder.geocode(&location).await?;
        jobs::set_location(pool, &job.id, center, None).await?;
        tracing::info!(
            "Job {}: geocoded '{}' to ({:.4}, {:.4})",
            job.id,
            location,
            center.latitude,
            center.longitude
        );
        Ok((center, location))
    }

    /// Primary layer: browser collection over the whole grid.
    ///
    /// When the soft limit fires the loop stops, the in-flight cell is
    /// dropped, and the job keeps what was checkpointed with a partial
    /// annotation. A cancelled job stops the same way but gets no final
    /// merge pass.
    pub(crate) async fn run_primary(&self, job: &Job, ctx: &RunContext) -> Result<()> {
        let pool = self.db.pool();
        let (center, location) = self.resolve_center(job).await?;

        jobs::update_status(pool, &job.id, JobStatus::GridSearch, Some("Generating search grid"))
            .await?;
        let grid = self.grid_for(center, job.radius_km)?;
        let total = grid.len();
        let detail_limit = detail_budget(total);
        tracing::info!(
            "Job {}: {} grid cells, detail budget {:?}",
            job.id,
            total,
            detail_limit
        );

        jobs::update_status(pool, &job.id, JobStatus::Playwright, Some("Collecting listings"))
            .await?;
        jobs::update_progress(pool, &job.id, primary_progress(0, total), "Collecting listings")
            .await?;

        let mut found = 0usize;
        let mut stopped_at = None;
        for (index, point) in grid.iter().enumerate() {
            if ctx.soft_limit.is_cancelled() {
                stopped_at = Some(index);
                break;
            }
            if self.is_cancelled(&job.id).await? {
                tracing::info!("Job {}: cancelled after {} of {} cells", job.id, index, total);
                return Ok(());
            }

            let request = CellRequest {
                keyword: &job.keyword,
                location: &location,
                coordinates: point.coordinates(),
                max_results: self.settings.max_results,
                detail_limit,
            };
            let outcome = tokio::select! {
                biased;
                () = ctx.soft_limit.cancelled() => None,
                outcome = self.sources.primary.collect(&request) => Some(outcome),
            };
            let Some(outcome) = outcome else {
                stopped_at = Some(index);
                break;
            };
            if self.is_cancelled(&job.id).await? {
                tracing::info!(
                    "Job {}: cancelled during cell {}/{}, dropping its {} leads",
                    job.id,
                    index + 1,
                    total,
                    outcome.leads.len()
                );
                return Ok(());
            }

            jobs::add_layer_calls(pool, &job.id, Layer::Playwright, outcome.attempted).await?;
            found += outcome.leads.len();
            let unique = self.checkpoint(&job.id, outcome.leads).await?;
            jobs::set_counts(pool, &job.id, count(found), unique).await?;
            jobs::update_progress(
                pool,
                &job.id,
                primary_progress(index + 1, total),
                &format!("Collected cell {}/{}", index + 1, total),
            )
            .await?;
            tracing::debug!(
                "Job {}: cell {}/{} done, {} found, {} unique",
                job.id,
                index + 1,
                total,
                found,
                unique
            );
        }

        // Cells merge against what came before them; one pass over the
        // whole set catches matches that only appear across later cells.
        jobs::update_status(pool, &job.id, JobStatus::Dedup, Some("Deduplicating")).await?;
        let unique = self.checkpoint(&job.id, Vec::new()).await?;
        jobs::set_counts(pool, &job.id, count(found), unique).await?;

        if let Some(done) = stopped_at {
            let reason = format!("soft time limit reached after {done} of {total} cells");
            tracing::warn!("Job {}: {}, keeping partial results", job.id, reason);
            jobs::set_partial_reason(pool, &job.id, Some(&reason)).await?;
        }
        Ok(())
    }

    /// Supplementary layer: search API over the grid, stopping on quota.
    pub(crate) async fn run_supplementary(
        &self,
        job: &Job,
        override_quota: bool,
        ctx: &RunContext,
    ) -> Result<()> {
        let Some(source) = self
            .sources
            .supplementary
            .as_ref()
            .filter(|source| source.is_enabled())
        else {
            tracing::info!("Job {}: supplementary search not configured, skipping", job.id);
            return Ok(());
        };
        let center = job.coordinates.ok_or_else(|| {
            PipelineError::Validation(format!("job {} has no resolved coordinates", job.id))
        })?;

        let pool = self.db.pool();
        let grid = self.grid_for(center, job.radius_km)?;
        let total = grid.len();
        let mut found = job.total_found;

        for (index, point) in grid.iter().enumerate() {
            if ctx.soft_limit.is_cancelled() {
                tracing::warn!(
                    "Job {}: soft time limit reached after {} of {} supplementary cells",
                    job.id,
                    index,
                    total
                );
                break;
            }
            if self.is_cancelled(&job.id).await? {
                tracing::info!("Job {}: cancelled during supplementary search", job.id);
                return Ok(());
            }

            let outcome = source
                .search(&SerpQuery {
                    query: &job.keyword,
                    coordinates: point.coordinates(),
                    zoom: self.settings.zoom,
                    override_quota,
                })
                .await;
            jobs::add_layer_calls(pool, &job.id, Layer::SerpApi, outcome.calls).await?;

            if !outcome.leads.is_empty() {
                found = found.saturating_add(count(outcome.leads.len()));
                let unique = self.checkpoint(&job.id, outcome.leads).await?;
                jobs::set_counts(pool, &job.id, found, unique).await?;
            }
            jobs::update_progress(
                pool,
                &job.id,
                job.progress,
                &format!("Supplementary search {}/{}", index + 1, total),
            )
            .await?;

            if outcome.quota_exhausted {
                tracing::warn!(
                    "Job {}: supplementary quota exhausted, skipping remaining {} cells",
                    job.id,
                    total - index - 1
                );
                break;
            }
        }
        Ok(())
    }

    /// Enrichment layer: the enrichment API, then website contact scans.
    ///
    /// A payment-required response ends the API pass but keeps what was
    /// already merged; website scans still run. Any other API error fails
    /// the layer after storing the batches merged before it.
    pub(crate) async fn run_enrichment(&self, job: &Job, ctx: &RunContext) -> Result<()> {
        let pool = self.db.pool();
        let mut records = leads::list_leads(pool, &job.id).await?;
        if records.is_empty() {
            tracing::info!("Job {}: no leads to enrich", job.id);
            return Ok(());
        }

        let mut changed = false;
        if let Some(source) = &self.sources.enrichment {
            jobs::update_progress(pool, &job.id, job.progress, "Enriching contacts").await?;
            let outcome = match source.enrich(&mut records).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let stored = leads::replace_leads(pool, &job.id, &records).await?;
                    jobs::set_counts(pool, &job.id, job.total_found, count(stored)).await?;
                    return Err(e.into());
                }
            };
            jobs::add_layer_calls(pool, &job.id, Layer::Enrichment, outcome.calls).await?;
            if outcome.payment_required {
                tracing::warn!(
                    "Job {}: enrichment stopped by payment gate, keeping {} enriched leads",
                    job.id,
                    outcome.enriched
                );
            }
            tracing::info!(
                "Job {}: enrichment looked up {} leads, enriched {}",
                job.id,
                outcome.looked_up,
                outcome.enriched
            );
            changed |= outcome.enriched > 0;
        }

        if self.settings.website_lookups {
            if let Some(contacts) = &self.sources.contacts {
                jobs::update_progress(pool, &job.id, job.progress, "Scanning websites").await?;
                let targets = records
                    .iter_mut()
                    .filter(|lead| {
                        lead.primary_email.is_none()
                            && lead.website.as_deref().is_some_and(|w| w.starts_with("http"))
                    })
                    .take(self.settings.max_website_lookups);

                let mut scanned = 0usize;
                let mut gained = 0usize;
                for lead in targets {
                    if ctx.soft_limit.is_cancelled() {
                        tracing::warn!(
                            "Job {}: soft time limit reached during website scans",
                            job.id
                        );
                        break;
                    }
                    if self.is_cancelled(&job.id).await? {
                        tracing::info!("Job {}: cancelled during website scans", job.id);
                        break;
                    }
                    let Some(website) = lead.website.clone() else {
                        continue;
                    };
                    let found = contacts.contacts(&website).await;
                    scanned += 1;
                    if !found.is_empty() {
                        changed = true;
                        if found.apply(lead) {
                            gained += 1;
                        }
                    }
                }
                tracing::info!(
                    "Job {}: scanned {} websites, {} gained an email",
                    job.id,
                    scanned,
                    gained
                );
            }
        }

        if changed {
            let stored = leads::replace_leads(pool, &job.id, &records).await?;
            jobs::set_counts(pool, &job.id, job.total_found, count(stored)).await?;
        }
        Ok(())
    }
}
