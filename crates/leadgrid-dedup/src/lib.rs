//! LeadGrid Dedup - collapses records that describe the same business.
//!
//! Records arrive from several collectors, each with its own identifier
//! scheme. [`merge`] reduces them to one record per business in three
//! passes:
//!
//! 1. records sharing a high-confidence identifier are grouped exactly;
//! 2. the rest are matched by name similarity and proximity;
//! 3. the combined output is re-matched across identifier formats.
//!
//! Field-level merging follows [`merge_into`].
//!
//! # Example
//!
//! ```rust
//! use leadgrid_core::{Lead, LeadSource};
//!
//! let a = Lead::new("ChIJabc", LeadSource::Playwright, "Jo's Coffee");
//! let b = Lead::new("ChIJabc", LeadSource::SerpApi, "Jo's Coffee");
//! let merged = leadgrid_dedup::merge(vec![a, b]);
//! assert_eq!(merged.len(), 1);
//! assert_eq!(merged[0].source_tag(), "playwright+serp_api");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod engine;
pub mod fields;
pub mod matching;

pub use engine::{merge, merge_with};
pub use fields::merge_into;
pub use matching::{name_similarity, normalize_name, MatchPolicy};
