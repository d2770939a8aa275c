//! Supplementary listings from the SerpAPI `google_maps` engine.
//!
//! Each call is metered against the monthly ceiling and paced. HTTP and API
//! errors end pagination for the cell but never fail the caller; the outcome
//! reports how many calls were made and whether the quota ran out.

use crate::common::{build_http_client, usable_key};
use crate::error::{excerpt, Result};
use crate::pacing::Pacer;
use crate::usage::UsageTracker;
use leadgrid_core::{Coordinates, Lead, LeadSource, SerpConfig};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

const PROVIDER: &str = "serpapi";

/// Usage level at which a warning is logged before every call.
const APPROACHING_LIMIT_MARGIN: u32 = 10;

/// One supplementary search.
#[derive(Debug, Clone)]
pub struct SerpQuery<'a> {
    /// Search text, e.g. `coffee`
    pub query: &'a str,
    /// Cell centre
    pub coordinates: Coordinates,
    /// Map zoom level
    pub zoom: u8,
    /// Proceed past the monthly ceiling
    pub override_quota: bool,
}

/// Result of one supplementary search.
#[derive(Debug, Clone, Default)]
pub struct SerpOutcome {
    /// Listings mapped to the shared lead shape
    pub leads: Vec<Lead>,
    /// API calls made
    pub calls: u32,
    /// The monthly ceiling stopped the search
    pub quota_exhausted: bool,
}

#[derive(Debug, Deserialize)]
struct SerpResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    local_results: Vec<Value>,
    #[serde(default)]
    serpapi_pagination: Option<SerpPagination>,
}

#[derive(Debug, Deserialize)]
struct SerpPagination {
    #[serde(default)]
    next: Option<String>,
}

/// SerpAPI client.
pub struct SerpClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    max_pages: u32,
    monthly_limit: u32,
    usage: Arc<dyn UsageTracker>,
    pacer: Pacer,
}

impl SerpClient {
    /// Create a client from configuration and a shared usage counter.
    pub fn new(config: &SerpConfig, usage: Arc<dyn UsageTracker>) -> Result<Self> {
        Ok(Self {
            client: build_http_client(Some(config.timeout_secs), None)?,
            api_key: usable_key(config.api_key.as_deref()),
            base_url: config.base_url.clone(),
            max_pages: config.max_pages.max(1),
            monthly_limit: config.monthly_limit,
            usage,
            pacer: Pacer::per_second(config.requests_per_second),
        })
    }

    /// Whether an API key is configured.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    /// Whether the monthly ceiling has been reached.
    #[must_use]
    pub fn quota_reached(&self) -> bool {
        self.usage.used() >= self.monthly_limit
    }

    /// Search one cell, following pagination.
    pub async fn search(&self, query: &SerpQuery<'_>) -> SerpOutcome {
        let mut outcome = SerpOutcome::default();
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::warn!("SerpAPI key not configured, skipping search");
            return outcome;
        };

        let viewport = format!(
            "@{},{},{}z",
            query.coordinates.latitude, query.coordinates.longitude, query.zoom
        );
        let mut start = 0usize;

        for page in 0..self.max_pages {
            let used = self.usage.used();
            if used >= self.monthly_limit {
                if query.override_quota {
                    tracing::warn!(
                        "SerpAPI monthly limit reached ({}/{}), proceeding on override",
                        used,
                        self.monthly_limit
                    );
                } else {
                    tracing::warn!(
                        "SerpAPI monthly limit reached ({}/{}), skipping search",
                        used,
                        self.monthly_limit
                    );
                    outcome.quota_exhausted = true;
                    break;
                }
            } else if used + APPROACHING_LIMIT_MARGIN >= self.monthly_limit {
                tracing::warn!(
                    "SerpAPI approaching monthly limit: {}/{} searches used",
                    used,
                    self.monthly_limit
                );
            }

            self.pacer.wait().await;
            self.usage.increment(1);
            outcome.calls += 1;

            let start_param = start.to_string();
            let response = self
                .client
                .get(&self.base_url)
                .query(&[
                    ("engine", "google_maps"),
                    ("q", query.query),
                    ("ll", viewport.as_str()),
                    ("type", "search"),
                    ("api_key", api_key),
                    ("start", start_param.as_str()),
                    ("no_cache", "false"),
                ])
                .send()
                .await;

            let body = match response {
                Ok(response) if response.status().is_success() => {
                    match response.json::<SerpResponse>().await {
                        Ok(body) => body,
                        Err(e) => {
                            tracing::error!("SerpAPI response could not be parsed: {}", e);
                            break;
                        }
                    }
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let text = response.text().await.unwrap_or_default();
                    tracing::error!("SerpAPI error: {} {}", status, excerpt(&text, 500));
                    break;
                }
                Err(e) => {
                    tracing::error!("SerpAPI request failed: {}", e);
                    break;
                }
            };

            if let Some(error) = body.error {
                tracing::error!("SerpAPI error response: {}", error);
                break;
            }
            if body.local_results.is_empty() {
                break;
            }

            let page_len = body.local_results.len();
            outcome
                .leads
                .extend(body.local_results.into_iter().filter_map(map_result));

            tracing::debug!(
                "SerpAPI page {}: {} results for '{}' at ({:.4}, {:.4}) [usage: {}/{}]",
                page + 1,
                page_len,
                query.query,
                query.coordinates.latitude,
                query.coordinates.longitude,
                self.usage.used(),
                self.monthly_limit
            );

            let has_next = body
                .serpapi_pagination
                .and_then(|p| p.next)
                .is_some_and(|next| !next.is_empty());
            if !has_next {
                break;
            }
            start += page_len;
        }

        tracing::info!(
            "SerpAPI search complete: {} results, {} API calls for '{}' [monthly: {}/{}]",
            outcome.leads.len(),
            outcome.calls,
            query.query,
            self.usage.used(),
            self.monthly_limit
        );
        outcome
    }
}

fn str_field(item: &Value, key: &str) -> Option<String> {
    item.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Map one `local_results` entry; entries without an identifier are dropped.
fn map_result(item: Value) -> Option<Lead> {
    let Some(source_id) = str_field(&item, "place_id").or_else(|| str_field(&item, "data_id"))
    else {
        tracing::debug!("Dropping SerpAPI result without identifier");
        return None;
    };
    let name = str_field(&item, "title").unwrap_or_else(|| "Unknown".to_string());

    let mut lead = Lead::new(source_id, LeadSource::SerpApi, name);
    lead.address = str_field(&item, "address");
    lead.phone = str_field(&item, "phone");
    lead.website = str_field(&item, "website");
    lead.rating = item.get("rating").and_then(Value::as_f64);
    lead.review_count = item
        .get("reviews")
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok());
    lead.category = str_field(&item, "type");
    lead.types = lead.category.iter().cloned().collect();
    lead.coordinates = item.get("gps_coordinates").and_then(|gps| {
        let latitude = gps.get("latitude")?.as_f64()?;
        let longitude = gps.get("longitude")?.as_f64()?;
        Coordinates::checked(latitude, longitude).ok()
    });
    lead.opening_hours = match item.get("operating_hours") {
        Some(Value::String(text)) if !text.is_empty() => Some(text.clone()),
        Some(hours @ Value::Object(map)) if !map.is_empty() => Some(hours.to_string()),
        _ => None,
    };
    lead.photos = str_field(&item, "thumbnail").into_iter().collect();
    lead.maps_url = str_field(&item, "place_id_search");
    lead.raw = Some(item);

    Some(lead)
}
