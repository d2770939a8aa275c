//! LeadGrid Core - Foundation crate for the LeadGrid collection pipeline.
//!
//! This crate provides the shared lead model, error handling, configuration
//! management, and geo utilities that every other LeadGrid crate depends on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths and env overrides
//! - [`types`] - The normalized [`Lead`] record and its identity types
//! - [`geo`] - Great-circle distance
//! - [`grid`] - Area-coverage grid generation and call/cost estimates
//!
//! # Example
//!
//! ```rust
//! use leadgrid_core::{generate_grid, Coordinates};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let center = Coordinates::new(30.2672, -97.7431);
//! let grid = generate_grid(center, 2.0, 0.2)?;
//! assert_eq!(grid.len(), 1);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod geo;
pub mod grid;
pub mod types;

// Re-export commonly used types
pub use config::{
    AppConfig, BrowserConfig, CollectorConfig, DatabaseConfig, EnrichmentConfig, GeocoderConfig,
    GridConfig, LimitsConfig, SerpConfig, WorkerConfig,
};
pub use error::{ConfigError, ConfigResult, CoreError, GeoError, Result};
pub use geo::distance_km;
pub use grid::{estimate_api_calls, estimate_cost_usd, generate_grid, ApiCallEstimate, GridPoint};
pub use types::{Coordinates, IdKind, Lead, LeadSource, RatingBreakdown};
