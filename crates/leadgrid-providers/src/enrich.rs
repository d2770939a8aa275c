//! Contact enrichment through the Outscraper maps search API.
//!
//! Leads still missing an email are looked up in batches keyed by
//! `name, address`. Results are merged additively: a populated field is
//! never overwritten.

use crate::common::{build_http_client, usable_key};
use crate::error::{excerpt, ProviderError, Result};
use crate::usage::UsageTracker;
use leadgrid_core::{EnrichmentConfig, Lead};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const PROVIDER: &str = "outscraper";

/// Hard cap on businesses per lookup call.
pub const MAX_BATCH_SIZE: usize = 20;

/// Usage level at which a warning is logged before enriching.
const APPROACHING_LIMIT_MARGIN: u32 = 50;

/// Result of one enrichment pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichOutcome {
    /// Lookup calls made
    pub calls: u32,
    /// Records sent for lookup
    pub looked_up: usize,
    /// Records that gained an email
    pub enriched: usize,
    /// The billing gate stopped the remaining batches
    pub payment_required: bool,
    /// The monthly ceiling left nothing to look up
    pub quota_exhausted: bool,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<Value>,
}

/// Fields read from one enrichment match.
#[derive(Debug, Default, Deserialize)]
struct EnrichmentRecord {
    email: Option<String>,
    phone: Option<String>,
    site: Option<String>,
    owner_title: Option<String>,
    facebook: Option<String>,
    instagram: Option<String>,
    twitter: Option<String>,
    linkedin: Option<String>,
    youtube: Option<String>,
}

impl EnrichmentRecord {
    fn socials(&self) -> [(&'static str, Option<&str>); 5] {
        [
            ("facebook", self.facebook.as_deref()),
            ("instagram", self.instagram.as_deref()),
            ("twitter", self.twitter.as_deref()),
            ("linkedin", self.linkedin.as_deref()),
            ("youtube", self.youtube.as_deref()),
        ]
    }
}

/// Whether `email` is acceptable as a contact address.
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    !email.is_empty() && email.contains('@')
}

/// Whether `url` is acceptable as a website or social link.
#[must_use]
pub fn is_valid_url(url: &str) -> bool {
    url.trim().starts_with("http")
}

/// Add an email to a lead without replacing existing data.
///
/// Returns `true` if the lead had no primary email and now has one.
pub fn add_email(lead: &mut Lead, email: &str) -> bool {
    if !is_valid_email(email) {
        return false;
    }
    let email = email.trim().to_string();
    if !lead.emails.contains(&email) {
        lead.emails.push(email.clone());
    }
    if lead.primary_email.is_none() {
        lead.primary_email = Some(email);
        return true;
    }
    false
}

/// Add a social link to a lead unless that network is already known.
pub fn add_social_link(lead: &mut Lead, network: &str, url: &str) {
    if is_valid_url(url) {
        lead.social_links
            .entry(network.to_string())
            .or_insert_with(|| url.trim().to_string());
    }
}

/// Set `field` if it is empty and `value` is usable.
fn fill(field: &mut Option<String>, value: Option<&str>) {
    if field.is_none() {
        if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
            *field = Some(value.to_string());
        }
    }
}

fn merge_record(lead: &mut Lead, record: &EnrichmentRecord) -> bool {
    let gained_email = record
        .email
        .as_deref()
        .is_some_and(|email| add_email(lead, email));

    for (network, url) in record.socials() {
        if let Some(url) = url {
            add_social_link(lead, network, url);
        }
    }

    fill(&mut lead.phone, record.phone.as_deref());
    fill(
        &mut lead.website,
        record.site.as_deref().filter(|site| is_valid_url(site)),
    );
    fill(&mut lead.owner_name, record.owner_title.as_deref());

    gained_email
}

/// Whether a lead is worth an enrichment lookup.
#[must_use]
pub fn needs_enrichment(lead: &Lead) -> bool {
    lead.primary_email.is_none()
        && !lead.name.trim().is_empty()
        && lead.address.as_deref().is_some_and(|a| !a.trim().is_empty())
}

/// Outscraper client.
pub struct OutscraperClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    batch_size: usize,
    batch_delay: Duration,
    monthly_limit: u32,
    usage: Arc<dyn UsageTracker>,
}

impl OutscraperClient {
    /// Create a client from configuration and a shared usage counter.
    pub fn new(config: &EnrichmentConfig, usage: Arc<dyn UsageTracker>) -> Result<Self> {
        Ok(Self {
            client: build_http_client(Some(config.timeout_secs), None)?,
            api_key: usable_key(config.api_key.as_deref()),
            base_url: config.base_url.clone(),
            batch_size: config.batch_size.clamp(1, MAX_BATCH_SIZE),
            batch_delay: Duration::from_millis(config.batch_delay_ms),
            monthly_limit: config.monthly_limit,
            usage,
        })
    }

    /// Whether an API key is configured.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    /// Enrich `leads` in place.
    ///
    /// Timeouts skip a batch; a `402 Payment Required` stops the run and any
    /// other HTTP error ends it early. Enrichment already merged is kept in
    /// every case. Only an unreadable success response is an error.
    pub async fn enrich(&self, leads: &mut [Lead]) -> Result<EnrichOutcome> {
        let mut outcome = EnrichOutcome::default();
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::info!("Outscraper API key not configured, skipping enrichment");
            return Ok(outcome);
        };

        let used = self.usage.used();
        let remaining = self.monthly_limit.saturating_sub(used) as usize;
        if remaining == 0 {
            tracing::warn!(
                "Outscraper monthly limit reached ({}/{}), skipping enrichment",
                used,
                self.monthly_limit
            );
            outcome.quota_exhausted = true;
            return Ok(outcome);
        }
        if used + APPROACHING_LIMIT_MARGIN >= self.monthly_limit {
            tracing::warn!(
                "Outscraper approaching monthly limit: {}/{} records used",
                used,
                self.monthly_limit
            );
        }

        let targets: Vec<usize> = leads
            .iter()
            .enumerate()
            .filter(|(_, lead)| needs_enrichment(lead))
            .map(|(index, _)| index)
            .take(remaining)
            .collect();
        if targets.is_empty() {
            tracing::info!("No leads need enrichment");
            return Ok(outcome);
        }
        tracing::info!(
            "Enriching {} leads via Outscraper (usage: {}/{})",
            targets.len(),
            used,
            self.monthly_limit
        );

        let batches: Vec<&[usize]> = targets.chunks(self.batch_size).collect();
        for (batch_number, batch) in batches.iter().enumerate() {
            if batch_number > 0 && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }

            let mut params: Vec<(&str, String)> = batch
                .iter()
                .map(|&index| {
                    let lead = &leads[index];
                    (
                        "query",
                        format!("{}, {}", lead.name, lead.address.as_deref().unwrap_or_default()),
                    )
                })
                .collect();
            params.push(("limit", "1".to_string()));
            params.push(("async", "false".to_string()));

            outcome.calls += 1;
            let response = self
                .client
                .get(&self.base_url)
                .header("X-API-KEY", api_key)
                .query(&params)
                .send()
                .await;

            let response = match response {
                Ok(response) => response,
                Err(e) if e.is_timeout() => {
                    tracing::error!("Outscraper timeout for batch {}, skipping", batch_number + 1);
                    continue;
                }
                Err(e) => {
                    tracing::error!("Outscraper request failed: {}", e);
                    break;
                }
            };

            let status = response.status();
            if status == StatusCode::PAYMENT_REQUIRED {
                tracing::warn!("Outscraper requires payment, stopping enrichment");
                outcome.payment_required = true;
                break;
            }
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                tracing::error!("Outscraper API error: {} {}", status.as_u16(), excerpt(&text, 500));
                break;
            }

            let body: SearchResponse = match response.json().await {
                Ok(body) => body,
                Err(e) if e.is_timeout() => {
                    tracing::error!("Outscraper timeout reading batch {}, skipping", batch_number + 1);
                    continue;
                }
                Err(e) => {
                    return Err(ProviderError::Parse {
                        provider: PROVIDER.to_string(),
                        message: e.to_string(),
                    })
                }
            };

            let mut enriched = 0;
            for (position, group) in body.data.into_iter().enumerate() {
                let Some(&index) = batch.get(position) else {
                    break;
                };
                let Some(record) = first_record(group) else {
                    continue;
                };
                if merge_record(&mut leads[index], &record) {
                    enriched += 1;
                }
            }

            let batch_len = u32::try_from(batch.len()).unwrap_or(u32::MAX);
            let total = self.usage.increment(batch_len);
            outcome.looked_up += batch.len();
            outcome.enriched += enriched;
            tracing::debug!(
                "Outscraper batch {}: {} of {} enriched [monthly: {}/{}]",
                batch_number + 1,
                enriched,
                batch.len(),
                total,
                self.monthly_limit
            );
        }

        tracing::info!(
            "Outscraper enrichment complete: {} leads looked up, {} enriched [monthly: {}/{}]",
            outcome.looked_up,
            outcome.enriched,
            self.usage.used(),
            self.monthly_limit
        );
        Ok(outcome)
    }
}

/// First match of a result group; groups are lists, sometimes bare objects.
fn first_record(group: Value) -> Option<EnrichmentRecord> {
    let first = match group {
        Value::Array(items) => items.into_iter().next()?,
        object @ Value::Object(_) => object,
        _ => return None,
    };
    serde_json::from_value(first).ok()
}
