//! Collector seams used by the layer runs.
//!
//! The orchestrator talks to its collectors through these traits so tests
//! can feed canned records without a browser or network.

use async_trait::async_trait;
use leadgrid_browser::BrowserLauncher;
use leadgrid_core::Lead;
use leadgrid_providers::{
    ContactExtractor, EnrichOutcome, OutscraperClient, ProviderError, SerpClient, SerpOutcome,
    SerpQuery, SiteContacts,
};
use leadgrid_scanner::{CellOutcome, CellRequest, Collector};

/// Primary, browser-driven collection of one grid cell.
#[async_trait]
pub trait PrimarySource: Send + Sync {
    /// Collect one cell. Never fails; an exhausted cell yields no leads.
    async fn collect(&self, request: &CellRequest<'_>) -> CellOutcome;
}

#[async_trait]
impl<L> PrimarySource for Collector<L>
where
    L: BrowserLauncher + 'static,
{
    async fn collect(&self, request: &CellRequest<'_>) -> CellOutcome {
        Collector::collect(self, request).await
    }
}

/// Supplementary, quota-limited search of one grid cell.
#[async_trait]
pub trait SupplementarySource: Send + Sync {
    /// Search one cell.
    async fn search(&self, query: &SerpQuery<'_>) -> SerpOutcome;

    /// Whether the source can make calls at all.
    fn is_enabled(&self) -> bool;
}

#[async_trait]
impl SupplementarySource for SerpClient {
    async fn search(&self, query: &SerpQuery<'_>) -> SerpOutcome {
        SerpClient::search(self, query).await
    }

    fn is_enabled(&self) -> bool {
        SerpClient::is_enabled(self)
    }
}

/// Batched contact enrichment of stored leads.
#[async_trait]
pub trait EnrichmentSource: Send + Sync {
    /// Enrich `leads` in place without overwriting populated fields.
    async fn enrich(&self, leads: &mut [Lead]) -> Result<EnrichOutcome, ProviderError>;
}

#[async_trait]
impl EnrichmentSource for OutscraperClient {
    async fn enrich(&self, leads: &mut [Lead]) -> Result<EnrichOutcome, ProviderError> {
        OutscraperClient::enrich(self, leads).await
    }
}

/// Keyless contact lookup on a business website.
#[async_trait]
pub trait ContactSource: Send + Sync {
    /// Contacts found on `website`; empty on any failure.
    async fn contacts(&self, website: &str) -> SiteContacts;
}

#[async_trait]
impl ContactSource for ContactExtractor {
    async fn contacts(&self, website: &str) -> SiteContacts {
        self.extract(website).await
    }
}
