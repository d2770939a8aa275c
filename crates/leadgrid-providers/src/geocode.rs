//! Address geocoding through Nominatim.

use crate::common::build_http_client;
use crate::error::{excerpt, ProviderError, Result};
use crate::pacing::Pacer;
use async_trait::async_trait;
use leadgrid_core::{Coordinates, GeocoderConfig};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const PROVIDER: &str = "nominatim";

/// Resolves free-text locations to coordinates.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Coordinates of `address`
    async fn geocode(&self, address: &str) -> Result<Coordinates>;

    /// Human-readable name of the place at `coordinates`
    async fn reverse(&self, coordinates: Coordinates) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct ReverseHit {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// OpenStreetMap Nominatim client.
///
/// Nominatim allows one request per second and requires a descriptive
/// user agent; both come from [`GeocoderConfig`].
pub struct NominatimGeocoder {
    client: Client,
    search_url: String,
    reverse_url: String,
    pacer: Pacer,
}

impl NominatimGeocoder {
    /// Create a geocoder from configuration.
    pub fn new(config: &GeocoderConfig) -> Result<Self> {
        Ok(Self {
            client: build_http_client(Some(config.timeout_secs), Some(&config.user_agent))?,
            search_url: config.base_url.clone(),
            reverse_url: config.reverse_url.clone(),
            pacer: Pacer::new(Duration::from_millis(config.min_delay_ms)),
        })
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        self.pacer.wait().await;
        let response = self.client.get(url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                provider: PROVIDER.to_string(),
                status: status.as_u16(),
                message: excerpt(&text, 200),
            });
        }

        response.json().await.map_err(|e| ProviderError::Parse {
            provider: PROVIDER.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, address: &str) -> Result<Coordinates> {
        let hits: Vec<SearchHit> = self
            .get(
                &self.search_url,
                &[
                    ("q", address.to_string()),
                    ("format", "json".to_string()),
                    ("limit", "1".to_string()),
                    ("addressdetails", "1".to_string()),
                ],
            )
            .await?;

        let hit = hits.into_iter().next().ok_or_else(|| ProviderError::Geocode {
            query: address.to_string(),
            reason: "no results found".to_string(),
        })?;

        let parse = |value: &str| {
            value.trim().parse::<f64>().map_err(|e| ProviderError::Geocode {
                query: address.to_string(),
                reason: format!("invalid coordinate '{value}': {e}"),
            })
        };
        let coordinates =
            Coordinates::checked(parse(&hit.lat)?, parse(&hit.lon)?).map_err(|e| {
                ProviderError::Geocode {
                    query: address.to_string(),
                    reason: e.to_string(),
                }
            })?;

        tracing::info!(
            "Geocoded '{}' -> ({}, {}) [{}]",
            address,
            coordinates.latitude,
            coordinates.longitude,
            hit.display_name
        );
        Ok(coordinates)
    }

    async fn reverse(&self, coordinates: Coordinates) -> Result<String> {
        let query = format!("{},{}", coordinates.latitude, coordinates.longitude);
        let hit: ReverseHit = self
            .get(
                &self.reverse_url,
                &[
                    ("lat", coordinates.latitude.to_string()),
                    ("lon", coordinates.longitude.to_string()),
                    ("format", "json".to_string()),
                    ("addressdetails", "1".to_string()),
                ],
            )
            .await?;

        if let Some(error) = hit.error {
            return Err(ProviderError::Geocode {
                query,
                reason: error,
            });
        }
        let name = hit
            .display_name
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| ProviderError::Geocode {
                query: query.clone(),
                reason: "empty result".to_string(),
            })?;

        tracing::info!("Reverse geocoded ({}) -> '{}'", query, name);
        Ok(name)
    }
}
