//! LeadGrid Pipeline - the job and layer state machine.
//!
//! A job moves through three independent layers: primary browser
//! collection, supplementary search API collection and contact enrichment.
//! The [`Pipeline`] validates and stores jobs, hands layer runs to a
//! [`WorkQueue`](leadgrid_scheduler::WorkQueue), and runs them when the queue
//! calls back:
//!
//! - the primary layer geocodes, builds the grid and collects cell by cell,
//!   merging and checkpointing after every cell;
//! - the supplementary layer searches the same grid until its quota runs out;
//! - the enrichment layer fills in contacts without overwriting anything.
//!
//! The overall job status is derived from the layer states after every
//! transition. Batches run their jobs' primary layers in order.
//!
//! # Example
//!
//! ```rust,ignore
//! use leadgrid_pipeline::{JobRequest, Pipeline};
//!
//! let pipeline = Arc::new(Pipeline::new(db, queue.clone(), sources, settings));
//! queue.attach(&pipeline);
//! let job = pipeline
//!     .create_job(&JobRequest::address("coffee", "Austin, TX", 5.0))
//!     .await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

mod batch;
pub mod error;
mod layers;
pub mod notify;
pub mod pipeline;
pub mod sources;
pub mod status;

pub use error::{PipelineError, Result};
pub use notify::{notify_detached, Notification, Notifier, TracingNotifier};
pub use pipeline::{JobRequest, Pipeline, PipelineSettings, Sources};
pub use sources::{ContactSource, EnrichmentSource, PrimarySource, SupplementarySource};
pub use status::{derive_status, detail_budget, MAX_GRID_CELLS};
