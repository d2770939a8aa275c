//! Per-cell collection with retry and backoff.

use crate::consent::{consent_cookies, dismiss_consent, dismiss_overlay, ConsentOutcome};
use crate::detail::{apply_detail, DETAIL_READY_SELECTOR};
use crate::error::{Result, ScanError};
use crate::parser::{
    parse_feed, Listing, END_MARKER_SELECTOR, END_MARKER_TEXT, FEED_ITEM_SELECTOR, FEED_SELECTOR,
};
use crate::url_builder::build_search_url;
use leadgrid_browser::{BrowserActions, BrowserError, BrowserLauncher, BrowserSession};
use leadgrid_core::{CollectorConfig, Coordinates, Lead};
use rand::Rng;
use std::time::Duration;

/// Listings the feed loads per scroll, roughly.
const LISTINGS_PER_SCROLL: usize = 15;
/// Upper bound on feed scrolls per cell.
const MAX_SCROLLS: usize = 8;
/// Consecutive unchanged counts before scrolling stops.
const STABLE_CHECKS: usize = 2;

/// One grid cell to collect.
#[derive(Debug, Clone)]
pub struct CellRequest<'a> {
    /// Search keyword, e.g. `coffee`
    pub keyword: &'a str,
    /// Free-text location appended to the query
    pub location: &'a str,
    /// Cell centre
    pub coordinates: Coordinates,
    /// Listings kept from the feed
    pub max_results: usize,
    /// Detail pages to visit; `None` visits all, `Some(0)` none
    pub detail_limit: Option<usize>,
}

/// Result of one cell.
#[derive(Debug, Clone, Default)]
pub struct CellOutcome {
    /// Listings collected; empty when every attempt failed
    pub leads: Vec<Lead>,
    /// Search pages attempted, counted once per cell
    pub attempted: u32,
}

/// Browser-driven collector for the primary layer.
pub struct Collector<L: BrowserLauncher> {
    launcher: L,
    config: CollectorConfig,
}

impl<L: BrowserLauncher> Collector<L> {
    /// Create a collector around a browser launcher.
    pub fn new(launcher: L, config: CollectorConfig) -> Self {
        Self { launcher, config }
    }

    /// Collector settings in use.
    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Number of feed scrolls allowed for `max_results` listings.
    #[must_use]
    pub fn scroll_budget(max_results: usize) -> usize {
        (max_results / LISTINGS_PER_SCROLL).clamp(1, MAX_SCROLLS)
    }

    /// Delay before retrying after the zero-based `attempt` failed.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = self.config.retry_backoff_factor.saturating_pow(attempt);
        Duration::from_millis(self.config.retry_backoff_base_ms.saturating_mul(factor))
    }

    /// Collect one cell.
    ///
    /// Never fails: after the attempt budget is spent the cell yields no
    /// leads and the caller moves on.
    pub async fn collect(&self, request: &CellRequest<'_>) -> CellOutcome {
        let url = match build_search_url(
            request.keyword,
            request.location,
            request.coordinates,
            self.config.zoom,
        ) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!("Cannot build search URL for '{}': {}", request.keyword, e);
                return CellOutcome {
                    leads: Vec::new(),
                    attempted: 1,
                };
            }
        };

        let detail_limit = if self.config.scrape_details {
            request.detail_limit
        } else {
            Some(0)
        };
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 0..max_attempts {
            match self.attempt(&url, request, detail_limit).await {
                Ok(leads) => {
                    tracing::info!(
                        "Collected {} listings at ({:.4}, {:.4})",
                        leads.len(),
                        request.coordinates.latitude,
                        request.coordinates.longitude
                    );
                    return CellOutcome { leads, attempted: 1 };
                }
                Err(e) if attempt + 1 < max_attempts => {
                    let delay = self.backoff_delay(attempt);
                    tracing::warn!(
                        "Cell collection failed: {} (attempt {}/{}), retrying in {:?}...",
                        e,
                        attempt + 1,
                        max_attempts,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::error!(
                        "Cell collection failed after {} attempts, skipping cell: {}",
                        max_attempts,
                        e
                    );
                }
            }
        }

        CellOutcome {
            leads: Vec::new(),
            attempted: 1,
        }
    }

    /// One attempt in a fresh browser that is always torn down.
    async fn attempt(
        &self,
        url: &str,
        request: &CellRequest<'_>,
        detail_limit: Option<usize>,
    ) -> Result<Vec<Lead>> {
        let session = self.launcher.launch().await?;
        let result = self.run(&session, url, request, detail_limit).await;
        if let Err(e) = session.close().await {
            tracing::debug!("Failed to close browser: {}", e);
        }
        result
    }

    async fn run(
        &self,
        session: &L::Session,
        url: &str,
        request: &CellRequest<'_>,
        detail_limit: Option<usize>,
    ) -> Result<Vec<Lead>> {
        let page = session.new_page(&consent_cookies()).await?;
        page.navigate(url).await?;

        let consent_pause = Duration::from_millis(self.config.consent_pause_ms);
        match dismiss_consent(&page, url, consent_pause).await? {
            ConsentOutcome::NotPresent => {
                dismiss_overlay(&page).await;
            }
            ConsentOutcome::Stuck => {
                return Err(ScanError::Interstitial {
                    url: page.current_url().await?,
                });
            }
            outcome => tracing::debug!("Consent cleared: {:?}", outcome),
        }

        match page
            .wait_for_selector(FEED_SELECTOR, self.config.feed_timeout_ms)
            .await
        {
            Ok(()) => {}
            Err(BrowserError::Timeout(_)) => {
                tracing::info!("No results feed for '{}', cell is empty", request.keyword);
                let _ = page.close().await;
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        }

        self.scroll_feed(&page, request.max_results).await?;

        let html = page.content().await?;
        let mut listings = parse_feed(&html, request.max_results);

        let visits = detail_limit.map_or(listings.len(), |limit| limit.min(listings.len()));
        for (index, listing) in listings.iter_mut().take(visits).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.detail_delay()).await;
            }
            if let Err(e) = self.visit_detail(&page, listing).await {
                tracing::debug!("Detail page failed for '{}': {}", listing.lead.name, e);
            }
        }

        let _ = page.close().await;
        Ok(listings.into_iter().map(Listing::into_lead).collect())
    }

    async fn scroll_feed<P: BrowserActions>(&self, page: &P, max_results: usize) -> Result<()> {
        let pause = Duration::from_millis(self.config.scroll_pause_ms);
        let mut last_count = page.count(FEED_ITEM_SELECTOR).await?;
        let mut unchanged = 0;

        for _ in 0..Self::scroll_budget(max_results) {
            if last_count >= max_results {
                break;
            }
            page.scroll_to_bottom(FEED_SELECTOR).await?;
            tokio::time::sleep(pause).await;

            if page.has_text(END_MARKER_SELECTOR, END_MARKER_TEXT).await? {
                tracing::debug!("Reached end of results at {} items", last_count);
                break;
            }

            let count = page.count(FEED_ITEM_SELECTOR).await?;
            if count == last_count {
                unchanged += 1;
                if unchanged >= STABLE_CHECKS {
                    break;
                }
            } else {
                unchanged = 0;
                last_count = count;
            }
        }
        Ok(())
    }

    async fn visit_detail<P: BrowserActions>(&self, page: &P, listing: &mut Listing) -> Result<()> {
        page.navigate(&listing.link).await?;
        page.wait_for_selector(DETAIL_READY_SELECTOR, self.config.selector_timeout_ms)
            .await?;
        let html = page.content().await?;
        let final_url = page.current_url().await?;
        apply_detail(listing, &html, &final_url);
        Ok(())
    }

    fn detail_delay(&self) -> Duration {
        let min = self.config.detail_delay_min_ms;
        let max = self.config.detail_delay_max_ms;
        if max <= min {
            return Duration::from_millis(min);
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}
