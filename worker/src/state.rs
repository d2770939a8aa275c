//! Process-wide wiring: one database, one queue, one pipeline.

use anyhow::{Context, Result};
use leadgrid_browser::{ChromiumLauncher, LaunchSettings};
use leadgrid_core::AppConfig;
use leadgrid_db::Database;
use leadgrid_pipeline::{
    ContactSource, EnrichmentSource, Pipeline, PipelineSettings, Sources, SupplementarySource,
};
use leadgrid_providers::{
    ContactExtractor, MonthlyUsage, NominatimGeocoder, OutscraperClient, SerpClient,
};
use leadgrid_scanner::Collector;
use leadgrid_scheduler::{QueueLimits, TokioQueue};
use std::sync::Arc;
use std::time::Duration;

const DRAIN_POLL: Duration = Duration::from_millis(500);

/// Everything a command needs.
pub struct AppState {
    pub config: AppConfig,
    pub db: Database,
    pub queue: Arc<TokioQueue>,
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    /// Open the database, apply migrations and wire the pipeline to its queue.
    pub async fn open(config: AppConfig) -> Result<Self> {
        let path = config.database_path()?;
        let db = Database::open(&path, &config.database)
            .await
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        db.run_migrations().await?;
        tracing::info!(
            "Database: {} (schema {})",
            path.display(),
            db.get_schema_version().await?
        );

        let limits = QueueLimits::from_config(&config.limits, &config.worker);
        let queue = Arc::new(TokioQueue::new(db.clone(), limits));
        let pipeline = Arc::new(Pipeline::new(
            db.clone(),
            queue.clone(),
            build_sources(&config)?,
            PipelineSettings::from_config(&config),
        ));
        queue.attach(&pipeline);

        Ok(Self {
            config,
            db,
            queue,
            pipeline,
        })
    }

    /// Wait until every spawned task has ended.
    pub async fn drain(&self) {
        while self.queue.in_flight() > 0 {
            tokio::time::sleep(DRAIN_POLL).await;
        }
    }
}

/// Build the collectors. Integrations without an API key are left out.
fn build_sources(config: &AppConfig) -> Result<Sources> {
    let collector = Collector::new(
        ChromiumLauncher::new(LaunchSettings::from(&config.browser)),
        config.collector.clone(),
    );

    let serp = SerpClient::new(&config.serp, Arc::new(MonthlyUsage::new()))?;
    let supplementary = if serp.is_enabled() {
        Some(Arc::new(serp) as Arc<dyn SupplementarySource>)
    } else {
        tracing::info!("SerpAPI key not configured, supplementary layer disabled");
        None
    };

    let outscraper = OutscraperClient::new(&config.enrichment, Arc::new(MonthlyUsage::new()))?;
    let enrichment = if outscraper.is_enabled() {
        Some(Arc::new(outscraper) as Arc<dyn EnrichmentSource>)
    } else {
        tracing::info!("Outscraper key not configured, only website lookups will enrich");
        None
    };

    let contacts = ContactExtractor::new(config.enrichment.website_timeout_secs)?;

    Ok(Sources {
        primary: Arc::new(collector),
        supplementary,
        enrichment,
        contacts: Some(Arc::new(contacts) as Arc<dyn ContactSource>),
        geocoder: Arc::new(NominatimGeocoder::new(&config.geocoder)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadgrid_db::jobs;

    #[tokio::test]
    async fn test_open_creates_database() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = AppConfig::default();
        config.database.path = Some(dir.path().join("nested").join("leadgrid.db"));

        let state = AppState::open(config).await.expect("open state");
        assert!(dir.path().join("nested").join("leadgrid.db").exists());
        assert!(jobs::list_jobs(state.db.pool(), 10)
            .await
            .expect("list jobs")
            .is_empty());

        state.drain().await;
        assert_eq!(state.queue.in_flight(), 0);
    }

    #[test]
    fn test_sources_without_keys() {
        let mut config = AppConfig::default();
        config.serp.api_key = None;
        config.enrichment.api_key = None;

        let sources = build_sources(&config).expect("sources");
        assert!(sources.supplementary.is_none());
        assert!(sources.enrichment.is_none());
        assert!(sources.contacts.is_some());
    }
}
