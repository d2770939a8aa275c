//! Configuration management for LeadGrid.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides.

use crate::error::{ConfigError, ConfigResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration.
///
/// This is loaded from `~/.config/leadgrid/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Lead/job storage settings
    pub database: DatabaseConfig,
    /// Headless browser settings
    pub browser: BrowserConfig,
    /// Primary collector behaviour
    pub collector: CollectorConfig,
    /// Area grid settings
    pub grid: GridConfig,
    /// Supplementary search API settings
    pub serp: SerpConfig,
    /// Contact enrichment API settings
    pub enrichment: EnrichmentConfig,
    /// Geocoding settings
    pub geocoder: GeocoderConfig,
    /// Wall-clock limits for a unit of work
    pub limits: LimitsConfig,
    /// Work queue settings
    pub worker: WorkerConfig,
}

impl AppConfig {
    /// Load configuration from disk, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from an explicit path, falling back to defaults.
    pub fn load_from(config_path: &Path) -> ConfigResult<Self> {
        if config_path.exists() {
            tracing::debug!("Loading config from {}", config_path.display());
            let contents = fs::read_to_string(config_path)?;
            let config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `LEADGRID_DATABASE_PATH`: Override the database file location
    /// - `LEADGRID_HEADLESS`: Override browser headless mode (true/false)
    /// - `LEADGRID_SERPAPI_KEY`: Supplementary search API key
    /// - `LEADGRID_OUTSCRAPER_API_KEY`: Enrichment API key
    /// - `LEADGRID_SOFT_TIME_LIMIT_SECS`: Override the soft run limit
    pub fn load_with_env() -> ConfigResult<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `LEADGRID_*` environment overrides on top of this config.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("LEADGRID_DATABASE_PATH") {
            tracing::debug!("Override database.path from env: {}", val);
            self.database.path = Some(PathBuf::from(val));
        }

        if let Ok(val) = std::env::var("LEADGRID_HEADLESS") {
            if let Ok(headless) = val.parse() {
                self.browser.headless = headless;
                tracing::debug!("Override browser.headless from env: {}", headless);
            }
        }

        if let Ok(val) = std::env::var("LEADGRID_SERPAPI_KEY") {
            if !val.is_empty() {
                self.serp.api_key = Some(val);
                tracing::debug!("Override serp.api_key from env");
            }
        }

        if let Ok(val) = std::env::var("LEADGRID_OUTSCRAPER_API_KEY") {
            if !val.is_empty() {
                self.enrichment.api_key = Some(val);
                tracing::debug!("Override enrichment.api_key from env");
            }
        }

        if let Ok(val) = std::env::var("LEADGRID_SOFT_TIME_LIMIT_SECS") {
            if let Ok(secs) = val.parse() {
                self.limits.soft_time_limit_secs = secs;
                tracing::debug!("Override limits.soft_time_limit_secs from env: {}", secs);
            }
        }
    }

    /// Check cross-field constraints that serde defaults cannot express.
    pub fn validate(&self) -> ConfigResult<()> {
        if !(0.0..=0.5).contains(&self.grid.overlap_factor) {
            return Err(ConfigError::InvalidValue {
                field: "grid.overlap_factor".to_string(),
                reason: "must be between 0.0 and 0.5".to_string(),
            });
        }
        if self.limits.soft_time_limit_secs >= self.limits.hard_time_limit_secs {
            return Err(ConfigError::InvalidValue {
                field: "limits.soft_time_limit_secs".to_string(),
                reason: "must be lower than limits.hard_time_limit_secs".to_string(),
            });
        }
        if self.collector.detail_delay_min_ms > self.collector.detail_delay_max_ms {
            return Err(ConfigError::InvalidValue {
                field: "collector.detail_delay_min_ms".to_string(),
                reason: "must not exceed collector.detail_delay_max_ms".to_string(),
            });
        }
        if self.enrichment.batch_size == 0 || self.enrichment.batch_size > 20 {
            return Err(ConfigError::InvalidValue {
                field: "enrichment.batch_size".to_string(),
                reason: "must be between 1 and 20".to_string(),
            });
        }
        Ok(())
    }

    /// Save configuration to disk.
    ///
    /// Creates the config directory if it doesn't exist. API keys are never written.
    pub fn save(&self) -> ConfigResult<()> {
        let config_path = Self::config_path()?;
        let config_dir = config_path
            .parent()
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "config_path".to_string(),
                reason: "no parent directory".to_string(),
            })?;

        fs::create_dir_all(config_dir)?;
        tracing::debug!("Saving config to {}", config_path.display());

        let contents = toml::to_string_pretty(self)?;
        fs::write(config_path, contents)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/leadgrid/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs =
            ProjectDirs::from("com", "leadgrid", "leadgrid").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path.
    ///
    /// Uses XDG base directories: `~/.local/share/leadgrid`
    pub fn data_dir() -> ConfigResult<PathBuf> {
        let dirs =
            ProjectDirs::from("com", "leadgrid", "leadgrid").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.data_dir().to_path_buf())
    }

    /// Resolve the database file, defaulting to `leadgrid.db` in the data directory.
    pub fn database_path(&self) -> ConfigResult<PathBuf> {
        match &self.database.path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::data_dir()?.join("leadgrid.db")),
        }
    }
}

/// Lead/job storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file path (defaults to the XDG data directory)
    pub path: Option<PathBuf>,
    /// Maximum pooled connections
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: 5,
        }
    }
}

/// Headless browser settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run browser in headless mode
    pub headless: bool,
    /// Navigation timeout in seconds
    pub navigation_timeout_secs: u64,
    /// Accept-Language / UI locale
    pub locale: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            navigation_timeout_secs: 30,
            locale: "en-US".to_string(),
        }
    }
}

/// Primary collector behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Listings kept per cell
    pub max_results: usize,
    /// Map zoom level in the search URL
    pub zoom: u8,
    /// Attempts per cell before it is skipped
    pub max_attempts: u32,
    /// First retry delay in milliseconds
    pub retry_backoff_base_ms: u64,
    /// Multiplier applied to the retry delay after each failed attempt
    pub retry_backoff_factor: u64,
    /// Whether detail pages are visited at all
    pub scrape_details: bool,
    /// Lower bound of the randomized pause between detail pages
    pub detail_delay_min_ms: u64,
    /// Upper bound of the randomized pause between detail pages
    pub detail_delay_max_ms: u64,
    /// Timeout when waiting for in-page selectors
    pub selector_timeout_ms: u64,
    /// Timeout when waiting for the results feed
    pub feed_timeout_ms: u64,
    /// Pause after each scroll of the results feed
    pub scroll_pause_ms: u64,
    /// Pause after clicking a consent control
    pub consent_pause_ms: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_results: 60,
            zoom: 14,
            max_attempts: 3,
            retry_backoff_base_ms: 5_000,
            retry_backoff_factor: 3,
            scrape_details: true,
            detail_delay_min_ms: 3_000,
            detail_delay_max_ms: 8_000,
            selector_timeout_ms: 8_000,
            feed_timeout_ms: 15_000,
            scroll_pause_ms: 1_500,
            consent_pause_ms: 3_000,
        }
    }
}

/// Area grid settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Fraction of overlap between adjacent cells (0.0-0.5)
    pub overlap_factor: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            overlap_factor: 0.2,
        }
    }
}

/// Supplementary search API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerpConfig {
    /// API key; the collector is disabled without one
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Endpoint URL
    pub base_url: String,
    /// Outbound request ceiling
    pub requests_per_second: f64,
    /// Calls allowed per UTC calendar month
    pub monthly_limit: u32,
    /// Result pages fetched per cell
    pub max_pages: u32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for SerpConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://serpapi.com/search.json".to_string(),
            requests_per_second: 5.0,
            monthly_limit: 100,
            max_pages: 1,
            timeout_secs: 30,
        }
    }
}

/// Contact enrichment API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// API key; the collector is disabled without one
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Endpoint URL
    pub base_url: String,
    /// Records enriched per UTC calendar month
    pub monthly_limit: u32,
    /// Businesses per lookup call (at most 20)
    pub batch_size: usize,
    /// Pause between batches in milliseconds
    pub batch_delay_ms: u64,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Whether business websites are scanned for contacts after the API pass
    pub website_lookups: bool,
    /// Websites scanned per enrichment run
    pub max_website_lookups: usize,
    /// Timeout per website request in seconds
    pub website_timeout_secs: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.app.outscraper.com/maps/search-v3".to_string(),
            monthly_limit: 500,
            batch_size: 20,
            batch_delay_ms: 1_000,
            timeout_secs: 60,
            website_lookups: true,
            max_website_lookups: 50,
            website_timeout_secs: 10,
        }
    }
}

/// Geocoding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    /// Search endpoint URL
    pub base_url: String,
    /// Reverse lookup endpoint URL
    pub reverse_url: String,
    /// User agent sent with every request
    pub user_agent: String,
    /// Minimum pause between requests in milliseconds
    pub min_delay_ms: u64,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://nominatim.openstreetmap.org/search".to_string(),
            reverse_url: "https://nominatim.openstreetmap.org/reverse".to_string(),
            user_agent: "LeadGrid/0.1.0 (+https://github.com/leadgrid/leadgrid)".to_string(),
            min_delay_ms: 1_000,
            timeout_secs: 10,
        }
    }
}

/// Wall-clock limits applied to each unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// After this many seconds the run stops between cells and keeps partial results
    pub soft_time_limit_secs: u64,
    /// After this many seconds the unit of work is aborted
    pub hard_time_limit_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            soft_time_limit_secs: 3_300,
            hard_time_limit_secs: 3_600,
        }
    }
}

/// Work queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Units of work allowed to run at once
    pub concurrency: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { concurrency: 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.browser.headless);
        assert_eq!(config.collector.max_attempts, 3);
        assert_eq!(config.collector.retry_backoff_base_ms, 5_000);
        assert_eq!(config.serp.monthly_limit, 100);
        assert_eq!(config.enrichment.monthly_limit, 500);
        assert_eq!(config.enrichment.batch_size, 20);
        assert_eq!(config.worker.concurrency, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_api_keys_are_not_serialized() {
        let mut config = AppConfig::default();
        config.serp.api_key = Some("secret-serp".to_string());
        config.enrichment.api_key = Some("secret-outscraper".to_string());

        let toml_str = toml::to_string_pretty(&config).expect("serialize config");
        assert!(toml_str.contains("[serp]"));
        assert!(!toml_str.contains("secret-serp"));
        assert!(!toml_str.contains("secret-outscraper"));
    }

    #[test]
    fn test_load_from_file() {
        let tmp = TempDir::new().expect("create temp dir");
        let config_path = tmp.path().join("config.toml");

        let toml_str = r#"
[grid]
overlap_factor = 0.3

[serp]
api_key = "from-file"
monthly_limit = 250
"#;
        fs::write(&config_path, toml_str).expect("write config file");

        let config = AppConfig::load_from(&config_path).expect("load config");
        assert!((config.grid.overlap_factor - 0.3).abs() < f64::EPSILON);
        assert_eq!(config.serp.api_key.as_deref(), Some("from-file"));
        assert_eq!(config.serp.monthly_limit, 250);
        // Untouched sections keep their defaults
        assert_eq!(config.enrichment.monthly_limit, 500);
        assert_eq!(config.limits.hard_time_limit_secs, 3_600);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let tmp = TempDir::new().expect("create temp dir");
        let config = AppConfig::load_from(&tmp.path().join("absent.toml")).expect("load config");
        assert_eq!(config.collector.zoom, 14);
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("LEADGRID_HEADLESS", "false");
        std::env::set_var("LEADGRID_SERPAPI_KEY", "env-key");
        std::env::set_var("LEADGRID_SOFT_TIME_LIMIT_SECS", "120");

        let mut config = AppConfig::default();
        config.apply_env_overrides();
        assert!(!config.browser.headless);
        assert_eq!(config.serp.api_key.as_deref(), Some("env-key"));
        assert_eq!(config.limits.soft_time_limit_secs, 120);

        std::env::remove_var("LEADGRID_HEADLESS");
        std::env::remove_var("LEADGRID_SERPAPI_KEY");
        std::env::remove_var("LEADGRID_SOFT_TIME_LIMIT_SECS");
    }

    #[test]
    fn test_validate_rejects_inverted_limits() {
        let mut config = AppConfig::default();
        config.limits.soft_time_limit_secs = 4_000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "limits.soft_time_limit_secs"
        ));
    }

    #[test]
    fn test_validate_rejects_oversized_batches() {
        let mut config = AppConfig::default();
        config.enrichment.batch_size = 50;
        assert!(config.validate().is_err());
    }
}
