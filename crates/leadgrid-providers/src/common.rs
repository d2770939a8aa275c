//! Common utilities shared across provider clients.

use crate::error::{ProviderError, Result};
use reqwest::Client;
use std::time::Duration;

/// User agent for requests to business websites.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Build a standard HTTP client with common timeout settings.
///
/// # Arguments
/// * `timeout_secs` - Timeout in seconds (defaults to 60 if not specified)
/// * `user_agent` - Optional `User-Agent` header sent with every request
pub fn build_http_client(timeout_secs: Option<u64>, user_agent: Option<&str>) -> Result<Client> {
    let mut builder = Client::builder()
        .timeout(Duration::from_secs(timeout_secs.unwrap_or(60)))
        .connect_timeout(Duration::from_secs(10));
    if let Some(agent) = user_agent {
        builder = builder.user_agent(agent);
    }
    builder
        .build()
        .map_err(|e| ProviderError::Internal(format!("failed to create HTTP client: {e}")))
}

/// API key, treating blank strings as absent.
#[must_use]
pub fn usable_key(key: Option<&str>) -> Option<String> {
    key.map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
}
