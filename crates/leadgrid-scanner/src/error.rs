//! Errors raised inside a single cell attempt.
//!
//! Every variant is recoverable at the cell level: the collector retries the
//! attempt and, once the attempt budget is spent, yields an empty cell.

use thiserror::Error;

/// Failure of one collection attempt.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Consent or block page still showing after the fallback chain
    #[error("stuck on interstitial page: {url}")]
    Interstitial {
        /// URL the browser ended up on
        url: String,
    },

    /// Search URL could not be built
    #[error("invalid search URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Browser launch, navigation, or script failure
    #[error("browser error: {0}")]
    Browser(#[from] leadgrid_browser::BrowserError),
}

/// Result type alias using `ScanError`.
pub type Result<T> = std::result::Result<T, ScanError>;
