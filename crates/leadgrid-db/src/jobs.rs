//! Job records: one collection request and its layer sub-states.

use crate::error::{DatabaseError, Result};
use chrono::{DateTime, Utc};
use leadgrid_core::Coordinates;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

/// Stored error text is cut to this many characters.
pub const MAX_ERROR_LEN: usize = 2000;

/// Overall job status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, nothing attempted yet
    Pending,
    /// Resolving the location to coordinates
    Geocoding,
    /// Computing the search grid
    GridSearch,
    /// Primary browser collection running
    Playwright,
    /// Supplementary search API collection running
    SerpApi,
    /// Merging records
    Dedup,
    /// Contact enrichment running
    Enriching,
    /// Finished (possibly partially, see `partial_reason`)
    Completed,
    /// Every attempted layer failed
    Failed,
    /// Stopped by the user
    Cancelled,
}

impl JobStatus {
    /// Stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Geocoding => "geocoding",
            Self::GridSearch => "grid_search",
            Self::Playwright => "playwright",
            Self::SerpApi => "serp_api",
            Self::Dedup => "dedup",
            Self::Enriching => "enriching",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse the stored representation.
    pub fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "pending" => Self::Pending,
            "geocoding" => Self::Geocoding,
            "grid_search" => Self::GridSearch,
            "playwright" => Self::Playwright,
            "serp_api" => Self::SerpApi,
            "dedup" => Self::Dedup,
            "enriching" => Self::Enriching,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            other => return Err(DatabaseError::Decode(format!("unknown job status '{other}'"))),
        })
    }

    /// Whether the job has reached an end state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sub-state of one collection layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LayerState {
    /// Never started
    Idle,
    /// In progress
    Running,
    /// Last run finished
    Completed,
    /// Last run failed
    Failed,
}

impl LayerState {
    /// Stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse the stored representation.
    pub fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "idle" => Self::Idle,
            "running" => Self::Running,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            other => {
                return Err(DatabaseError::Decode(format!("unknown layer state '{other}'")))
            }
        })
    }
}

impl std::fmt::Display for LayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three independent collection layers of a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    /// Browser-driven primary collection
    Playwright,
    /// Supplementary search API collection
    SerpApi,
    /// Contact enrichment
    Enrichment,
}

impl Layer {
    /// All layers in run order.
    pub const ALL: [Self; 3] = [Self::Playwright, Self::SerpApi, Self::Enrichment];

    /// Stable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Playwright => "playwright",
            Self::SerpApi => "serp_api",
            Self::Enrichment => "enrichment",
        }
    }

    /// Job status shown while this layer runs.
    #[must_use]
    pub const fn active_status(self) -> JobStatus {
        match self {
            Self::Playwright => JobStatus::Playwright,
            Self::SerpApi => JobStatus::SerpApi,
            Self::Enrichment => JobStatus::Enriching,
        }
    }

    const fn state_column(self) -> &'static str {
        match self {
            Self::Playwright => "playwright_status",
            Self::SerpApi => "serp_status",
            Self::Enrichment => "enrichment_status",
        }
    }

    const fn completed_column(self) -> &'static str {
        match self {
            Self::Playwright => "playwright_completed_at",
            Self::SerpApi => "serp_completed_at",
            Self::Enrichment => "enrichment_completed_at",
        }
    }

    const fn calls_column(self) -> &'static str {
        match self {
            Self::Playwright => "playwright_pages",
            Self::SerpApi => "serp_calls",
            Self::Enrichment => "enrichment_calls",
        }
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the job's location was given.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LocationType {
    /// Free-text address, geocoded before collection
    Address,
    /// Explicit coordinates
    Coordinates,
}

impl LocationType {
    /// Stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Address => "address",
            Self::Coordinates => "coordinates",
        }
    }

    /// Parse the stored representation.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "address" => Ok(Self::Address),
            "coordinates" => Ok(Self::Coordinates),
            other => Err(DatabaseError::Decode(format!(
                "unknown location type '{other}'"
            ))),
        }
    }
}

/// State of one layer as stored on the job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LayerRecord {
    /// Current sub-state
    pub state: LayerState,
    /// When the layer last finished
    pub completed_at: Option<DateTime<Utc>>,
}

/// A collection job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier
    pub id: String,
    /// Owning batch, if any
    pub batch_id: Option<String>,
    /// Search keyword
    pub keyword: String,
    /// Location text (given, or reverse-geocoded for coordinate jobs)
    pub location: Option<String>,
    /// How the location was given
    pub location_type: LocationType,
    /// Resolved search center
    pub coordinates: Option<Coordinates>,
    /// Search radius in kilometres
    pub radius_km: f64,
    /// Overall status
    pub status: JobStatus,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Human-readable description of the current step
    pub current_step: Option<String>,
    /// Primary layer
    pub playwright: LayerRecord,
    /// Supplementary layer
    pub serp: LayerRecord,
    /// Enrichment layer
    pub enrichment: LayerRecord,
    /// Records collected before merging
    pub total_found: u32,
    /// Leads stored after merging
    pub total_unique: u32,
    /// Primary cells attempted
    pub playwright_pages: u32,
    /// Supplementary API calls made
    pub serp_calls: u32,
    /// Enrichment API calls made
    pub enrichment_calls: u32,
    /// Why a completed job holds partial results
    pub partial_reason: Option<String>,
    /// Last failure text
    pub error: Option<String>,
    /// Queue task currently responsible for this job
    pub task_id: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
    /// When the job reached a terminal status
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Stored state of `layer`.
    #[must_use]
    pub const fn layer(&self, layer: Layer) -> LayerRecord {
        match layer {
            Layer::Playwright => self.playwright,
            Layer::SerpApi => self.serp,
            Layer::Enrichment => self.enrichment,
        }
    }
}

/// Input for [`create_job`].
#[derive(Debug, Clone)]
pub struct NewJob {
    /// Search keyword
    pub keyword: String,
    /// Location text
    pub location: Option<String>,
    /// How the location was given
    pub location_type: LocationType,
    /// Known search center
    pub coordinates: Option<Coordinates>,
    /// Search radius in kilometres
    pub radius_km: f64,
    /// Owning batch
    pub batch_id: Option<String>,
}

const JOB_COLUMNS: &str = "id, batch_id, keyword, location, location_type, latitude, longitude, radius_km, \
     status, progress, current_step, \
     playwright_status, playwright_completed_at, serp_status, serp_completed_at, \
     enrichment_status, enrichment_completed_at, \
     total_found, total_unique, playwright_pages, serp_calls, enrichment_calls, \
     partial_reason, error, task_id, created_at, updated_at, completed_at";

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Decode(format!("invalid timestamp '{value}': {e}")))
}

pub(crate) fn parse_optional_timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_timestamp).transpose()
}

pub(crate) fn to_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

/// Cut `message` to [`MAX_ERROR_LEN`] characters.
#[must_use]
pub fn truncate_error(message: &str) -> String {
    message.chars().take(MAX_ERROR_LEN).collect()
}

fn layer_from_row(row: &SqliteRow, layer: Layer) -> Result<LayerRecord> {
    let state: String = row.try_get(layer.state_column())?;
    let completed_at: Option<String> = row.try_get(layer.completed_column())?;
    Ok(LayerRecord {
        state: LayerState::parse(&state)?,
        completed_at: parse_optional_timestamp(completed_at)?,
    })
}

fn job_from_row(row: &SqliteRow) -> Result<Job> {
    let latitude: Option<f64> = row.try_get("latitude")?;
    let longitude: Option<f64> = row.try_get("longitude")?;
    let coordinates = latitude
        .zip(longitude)
        .map(|(lat, lng)| Coordinates::new(lat, lng));

    let location_type: String = row.try_get("location_type")?;
    let status: String = row.try_get("status")?;
    let progress: i64 = row.try_get("progress")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Job {
        id: row.try_get("id")?,
        batch_id: row.try_get("batch_id")?,
        keyword: row.try_get("keyword")?,
        location: row.try_get("location")?,
        location_type: LocationType::parse(&location_type)?,
        coordinates,
        radius_km: row.try_get("radius_km")?,
        status: JobStatus::parse(&status)?,
        progress: u8::try_from(progress.clamp(0, 100)).unwrap_or(100),
        current_step: row.try_get("current_step")?,
        playwright: layer_from_row(row, Layer::Playwright)?,
        serp: layer_from_row(row, Layer::SerpApi)?,
        enrichment: layer_from_row(row, Layer::Enrichment)?,
        total_found: to_u32(row.try_get("total_found")?),
        total_unique: to_u32(row.try_get("total_unique")?),
        playwright_pages: to_u32(row.try_get("playwright_pages")?),
        serp_calls: to_u32(row.try_get("serp_calls")?),
        enrichment_calls: to_u32(row.try_get("enrichment_calls")?),
        partial_reason: row.try_get("partial_reason")?,
        error: row.try_get("error")?,
        task_id: row.try_get("task_id")?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
        completed_at: parse_optional_timestamp(row.try_get("completed_at")?)?,
    })
}

/// Insert a new pending job.
pub async fn create_job(pool: &Pool<Sqlite>, new: &NewJob) -> Result<Job> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO jobs (id, batch_id, keyword, location, location_type, latitude, longitude, radius_km, status, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?)",
    )
    .bind(&id)
    .bind(&new.batch_id)
    .bind(&new.keyword)
    .bind(&new.location)
    .bind(new.location_type.as_str())
    .bind(new.coordinates.map(|c| c.latitude))
    .bind(new.coordinates.map(|c| c.longitude))
    .bind(new.radius_km)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    tracing::debug!("Created job {} ('{}')", id, new.keyword);
    require_job(pool, &id).await
}

/// Fetch a job by ID.
pub async fn get_job(pool: &Pool<Sqlite>, id: &str) -> Result<Option<Job>> {
    let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Fetch a job by ID, failing if it does not exist.
pub async fn require_job(pool: &Pool<Sqlite>, id: &str) -> Result<Job> {
    get_job(pool, id)
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("job {id} not found")))
}

/// Jobs of a batch in creation order.
pub async fn list_batch_jobs(pool: &Pool<Sqlite>, batch_id: &str) -> Result<Vec<Job>> {
    let rows = sqlx::query(&format!(
        "SELECT {JOB_COLUMNS} FROM jobs WHERE batch_id = ? ORDER BY rowid"
    ))
    .bind(batch_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(job_from_row).collect()
}

/// Most recent jobs first.
pub async fn list_jobs(pool: &Pool<Sqlite>, limit: u32) -> Result<Vec<Job>> {
    let rows = sqlx::query(&format!(
        "SELECT {JOB_COLUMNS} FROM jobs ORDER BY rowid DESC LIMIT ?"
    ))
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await?;

    rows.iter().map(job_from_row).collect()
}

/// Set the overall status and optionally the step text.
///
/// Entering a terminal status stamps `completed_at`. A cancelled job keeps
/// its status; the update is a no-op.
pub async fn update_status(
    pool: &Pool<Sqlite>,
    id: &str,
    status: JobStatus,
    current_step: Option<&str>,
) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let completed_at = status.is_terminal().then(|| now.clone());

    sqlx::query(
        "UPDATE jobs SET status = ?, current_step = COALESCE(?, current_step), completed_at = ?, updated_at = ? WHERE id = ? AND status != 'cancelled'",
    )
    .bind(status.as_str())
    .bind(current_step)
    .bind(completed_at)
    .bind(&now)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Set progress (clamped to 100) and the step text.
pub async fn update_progress(
    pool: &Pool<Sqlite>,
    id: &str,
    progress: u8,
    current_step: &str,
) -> Result<()> {
    sqlx::query("UPDATE jobs SET progress = ?, current_step = ?, updated_at = ? WHERE id = ?")
        .bind(i64::from(progress.min(100)))
        .bind(current_step)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Set one layer's sub-state.
///
/// Finishing (completed or failed) stamps the layer's completion time.
pub async fn set_layer_state(
    pool: &Pool<Sqlite>,
    id: &str,
    layer: Layer,
    state: LayerState,
) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let completed_at = matches!(state, LayerState::Completed | LayerState::Failed)
        .then(|| now.clone());

    sqlx::query(&format!(
        "UPDATE jobs SET {} = ?, {} = COALESCE(?, {}), updated_at = ? WHERE id = ?",
        layer.state_column(),
        layer.completed_column(),
        layer.completed_column()
    ))
    .bind(state.as_str())
    .bind(completed_at)
    .bind(&now)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Record the resolved search center, and a location label if none is set.
pub async fn set_location(
    pool: &Pool<Sqlite>,
    id: &str,
    coordinates: Coordinates,
    label: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "UPDATE jobs SET latitude = ?, longitude = ?, location = COALESCE(location, ?), updated_at = ? WHERE id = ?",
    )
    .bind(coordinates.latitude)
    .bind(coordinates.longitude)
    .bind(label)
    .bind(Utc::now().to_rfc3339())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Set the found/unique counters.
pub async fn set_counts(
    pool: &Pool<Sqlite>,
    id: &str,
    total_found: u32,
    total_unique: u32,
) -> Result<()> {
    sqlx::query("UPDATE jobs SET total_found = ?, total_unique = ?, updated_at = ? WHERE id = ?")
        .bind(i64::from(total_found))
        .bind(i64::from(total_unique))
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Add to a layer's call counter.
pub async fn add_layer_calls(pool: &Pool<Sqlite>, id: &str, layer: Layer, calls: u32) -> Result<()> {
    if calls == 0 {
        return Ok(());
    }
    let column = layer.calls_column();
    sqlx::query(&format!(
        "UPDATE jobs SET {column} = {column} + ?, updated_at = ? WHERE id = ?"
    ))
    .bind(i64::from(calls))
    .bind(Utc::now().to_rfc3339())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Set or clear the partial-run annotation.
pub async fn set_partial_reason(pool: &Pool<Sqlite>, id: &str, reason: Option<&str>) -> Result<()> {
    sqlx::query("UPDATE jobs SET partial_reason = ?, updated_at = ? WHERE id = ?")
        .bind(reason)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Set or clear the failure text, truncated to [`MAX_ERROR_LEN`].
pub async fn set_error(pool: &Pool<Sqlite>, id: &str, error: Option<&str>) -> Result<()> {
    sqlx::query("UPDATE jobs SET error = ?, updated_at = ? WHERE id = ?")
        .bind(error.map(truncate_error))
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Record the queue task responsible for the job.
pub async fn set_task_id(pool: &Pool<Sqlite>, id: &str, task_id: Option<&str>) -> Result<()> {
    sqlx::query("UPDATE jobs SET task_id = ?, updated_at = ? WHERE id = ?")
        .bind(task_id)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Delete a job and, by cascade, its leads. Returns whether it existed.
pub async fn delete_job(pool: &Pool<Sqlite>, id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
