//! Pure rules of the job state machine.

use leadgrid_db::{Job, JobStatus, Layer, LayerState};

/// Largest grid a job may cover.
pub const MAX_GRID_CELLS: usize = 100;

/// Grids up to this size visit every detail page.
pub const FULL_DETAIL_MAX_CELLS: usize = 10;

/// Grids up to this size visit [`REDUCED_DETAIL_PAGES`] per cell.
pub const REDUCED_DETAIL_MAX_CELLS: usize = 30;

/// Detail pages per cell on mid-sized grids.
pub const REDUCED_DETAIL_PAGES: usize = 20;

const PRIMARY_PROGRESS_START: u8 = 15;
const PRIMARY_PROGRESS_END: u8 = 95;

/// Detail-page budget per cell for a grid of `cells`.
///
/// `None` visits every listing, `Some(0)` none.
#[must_use]
pub const fn detail_budget(cells: usize) -> Option<usize> {
    if cells <= FULL_DETAIL_MAX_CELLS {
        None
    } else if cells <= REDUCED_DETAIL_MAX_CELLS {
        Some(REDUCED_DETAIL_PAGES)
    } else {
        Some(0)
    }
}

/// Progress after `done` of `total` primary cells, spread over 15-95%.
#[must_use]
pub fn primary_progress(done: usize, total: usize) -> u8 {
    if total == 0 {
        return PRIMARY_PROGRESS_END;
    }
    let span = usize::from(PRIMARY_PROGRESS_END - PRIMARY_PROGRESS_START);
    let step = span * done.min(total) / total;
    PRIMARY_PROGRESS_START + u8::try_from(step).unwrap_or(0)
}

/// Overall status implied by the three layer states.
///
/// A cancelled job stays cancelled. A running layer shows as that layer's
/// active status. Otherwise the job is completed once the primary layer is,
/// failed only when every attempted layer failed, and pending when nothing
/// was attempted.
#[must_use]
pub fn derive_status(job: &Job) -> JobStatus {
    if job.status == JobStatus::Cancelled {
        return JobStatus::Cancelled;
    }

    if let Some(layer) = Layer::ALL
        .into_iter()
        .find(|&layer| job.layer(layer).state == LayerState::Running)
    {
        return layer.active_status();
    }

    if job.playwright.state == LayerState::Completed {
        return JobStatus::Completed;
    }

    let attempted: Vec<LayerState> = Layer::ALL
        .into_iter()
        .map(|layer| job.layer(layer).state)
        .filter(|&state| state != LayerState::Idle)
        .collect();

    if attempted.is_empty() {
        JobStatus::Pending
    } else if attempted.iter().all(|&state| state == LayerState::Failed) {
        JobStatus::Failed
    } else {
        JobStatus::Completed
    }
}
