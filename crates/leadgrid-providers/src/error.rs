//! Error types for the HTTP integrations.

use thiserror::Error;

/// Errors raised by provider clients.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Transport-level failure
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("API error ({provider}): status {status}, {message}")]
    Api {
        /// Provider name
        provider: String,
        /// HTTP status code
        status: u16,
        /// Response body excerpt
        message: String,
    },

    /// Billing gate reached; no further calls this run
    #[error("payment required by {provider}")]
    PaymentRequired {
        /// Provider name
        provider: String,
    },

    /// Monthly call ceiling reached
    #[error("{provider} monthly quota exhausted ({used}/{limit})")]
    QuotaExceeded {
        /// Provider name
        provider: String,
        /// Calls used this month
        used: u32,
        /// Monthly ceiling
        limit: u32,
    },

    /// Response body did not have the expected shape
    #[error("failed to parse response from {provider}: {message}")]
    Parse {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Address could not be resolved
    #[error("geocoding failed for '{query}': {reason}")]
    Geocode {
        /// Address or coordinates looked up
        query: String,
        /// Why the lookup failed
        reason: String,
    },

    /// Client could not be constructed
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias using `ProviderError`.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// First `max` characters of a response body, for logs and errors.
pub(crate) fn excerpt(body: &str, max: usize) -> String {
    body.chars().take(max).collect()
}
