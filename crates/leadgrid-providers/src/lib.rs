//! LeadGrid Providers - metered HTTP integrations.
//!
//! This crate holds every collector that talks to a third-party HTTP API:
//!
//! - [`SerpClient`]: supplementary listings from a search results API
//! - [`OutscraperClient`]: contact enrichment for existing leads
//! - [`ContactExtractor`]: keyless contact lookup on business websites
//! - [`NominatimGeocoder`]: address to coordinates and back
//!
//! The two paid integrations are metered by an injected [`UsageTracker`]
//! that resets on the UTC month boundary, and all outbound calls are paced.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod common;
pub mod contacts;
pub mod enrich;
pub mod error;
pub mod geocode;
pub mod pacing;
pub mod serp;
pub mod usage;

pub use contacts::{ContactExtractor, SiteContacts};
pub use enrich::{EnrichOutcome, OutscraperClient};
pub use error::{ProviderError, Result};
pub use geocode::{Geocoder, NominatimGeocoder};
pub use pacing::Pacer;
pub use serp::{SerpClient, SerpOutcome, SerpQuery};
pub use usage::{Clock, FixedClock, MonthlyUsage, SystemClock, UsageTracker};
