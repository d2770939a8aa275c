//! Units of work.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier assigned to an enqueued task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    /// Fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Task {
    /// Primary browser collection for a job
    Primary {
        /// Target job
        job_id: String,
    },
    /// Supplementary search API collection for a job
    Supplementary {
        /// Target job
        job_id: String,
        /// Run even when the monthly quota is used up
        #[serde(default)]
        override_quota: bool,
    },
    /// Contact enrichment for a job
    Enrichment {
        /// Target job
        job_id: String,
    },
    /// Every job of a batch, in order
    Batch {
        /// Target batch
        batch_id: String,
    },
}

impl Task {
    /// Short name stored with the task.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Primary { .. } => "primary",
            Self::Supplementary { .. } => "supplementary",
            Self::Enrichment { .. } => "enrichment",
            Self::Batch { .. } => "batch",
        }
    }

    /// Job targeted by a layer task.
    #[must_use]
    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::Primary { job_id }
            | Self::Supplementary { job_id, .. }
            | Self::Enrichment { job_id } => Some(job_id.as_str()),
            Self::Batch { .. } => None,
        }
    }

    /// JSON form stored in the task table.
    pub fn to_payload(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Decode a stored payload.
    pub fn from_payload(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Batch { batch_id } => write!(f, "batch {batch_id}"),
            _ => write!(f, "{} {}", self.kind(), self.job_id().unwrap_or_default()),
        }
    }
}
