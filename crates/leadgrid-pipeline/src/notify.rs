//! Failure and batch-summary notifications.
//!
//! Delivery is always best-effort: notifications are sent from a detached
//! task and a delivery failure is only logged.

use crate::error::Result;
use async_trait::async_trait;
use leadgrid_db::{BatchStatus, Layer};
use serde::Serialize;
use std::sync::Arc;

/// Something worth telling an operator about.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    /// A layer run failed
    LayerFailed {
        /// Failed job
        job_id: String,
        /// Job keyword
        keyword: String,
        /// Job location text
        location: Option<String>,
        /// Layer that failed
        layer: Layer,
        /// Truncated error text
        error: String,
    },
    /// A batch ran every member job
    BatchFinished {
        /// Finished batch
        batch_id: String,
        /// Batch name
        name: String,
        /// Where the summary should go
        notify_email: Option<String>,
        /// Final status
        status: BatchStatus,
        /// Jobs in the batch
        total_jobs: u32,
        /// Jobs whose primary layer completed
        completed_jobs: u32,
        /// Jobs whose primary layer failed
        failed_jobs: u32,
    },
}

/// Delivers notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one notification.
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        match notification {
            Notification::LayerFailed {
                job_id,
                keyword,
                location,
                layer,
                error,
            } => tracing::warn!(
                "Job {} ('{}' in {}) {} layer failed: {}",
                job_id,
                keyword,
                location.as_deref().unwrap_or("unknown location"),
                layer,
                error
            ),
            Notification::BatchFinished {
                batch_id,
                name,
                notify_email,
                status,
                total_jobs,
                completed_jobs,
                failed_jobs,
            } => tracing::info!(
                "Batch {} ('{}') {}: {}/{} completed, {} failed{}",
                batch_id,
                name,
                status,
                completed_jobs,
                total_jobs,
                failed_jobs,
                notify_email
                    .as_deref()
                    .map(|to| format!(", summary for {to}"))
                    .unwrap_or_default()
            ),
        }
        Ok(())
    }
}

/// Send `notification` from a detached task.
pub fn notify_detached(notifier: &Arc<dyn Notifier>, notification: Notification) {
    let notifier = Arc::clone(notifier);
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(&notification).await {
            tracing::warn!("Failed to send notification: {}", e);
        }
    });
}
