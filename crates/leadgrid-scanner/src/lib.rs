//! LeadGrid Scanner - the primary, browser-driven listing collector.
//!
//! One call to [`Collector::collect`] covers one grid cell: it launches a
//! fresh browser, gets past consent interstitials, scrolls the results feed,
//! parses listings, optionally visits detail pages, and assigns identifiers.
//!
//! # Features
//!
//! - Fresh, isolated browser per attempt, torn down on success or failure
//! - Ordered consent/interstitial fallback chain
//! - Scroll budget derived from the requested result count
//! - Bounded detail-page visits with randomized pacing
//! - Retry with exponential backoff; an exhausted cell yields no records
//!
//! # Example
//!
//! ```rust,ignore
//! use leadgrid_browser::{ChromiumLauncher, LaunchSettings};
//! use leadgrid_scanner::{CellRequest, Collector};
//!
//! let collector = Collector::new(ChromiumLauncher::new(LaunchSettings::default()), config);
//! let outcome = collector
//!     .collect(&CellRequest {
//!         keyword: "coffee",
//!         location: "Austin, TX",
//!         coordinates: point.coordinates(),
//!         max_results: 60,
//!         detail_limit: Some(20),
//!     })
//!     .await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod collector;
pub mod consent;
#[allow(missing_docs)]
pub mod detail;
pub mod error;
pub mod identifiers;
#[allow(missing_docs)]
pub mod parser;
#[allow(missing_docs)]
pub mod url_builder;

// Re-export commonly used types
pub use collector::{CellOutcome, CellRequest, Collector};
pub use consent::{consent_cookies, ConsentOutcome};
pub use error::{Result, ScanError};
pub use identifiers::{parse_coordinates, resolve_source_id, synthetic_id};
pub use parser::{parse_feed, parse_rating_text};
pub use url_builder::build_search_url;
