//! Area-coverage grid generation.
//!
//! A circular search area is covered by a square lattice of search points.
//! Each point is searched with a capped radius, so large areas become many
//! overlapping cells rather than one oversized query.

use crate::error::GeoError;
use crate::geo::{distance_km, EARTH_RADIUS_KM};
use crate::types::Coordinates;
use serde::{Deserialize, Serialize};

/// Largest radius a single cell is searched with.
pub const MAX_CELL_RADIUS_KM: f64 = 5.0;

/// Estimated place-search cost per request in USD.
pub const PLACE_CALL_COST_USD: f64 = 0.032;

/// Estimated search-results API cost per call in USD.
pub const SERP_CALL_COST_USD: f64 = 0.01;

/// One cell of the search grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridPoint {
    /// Cell centre latitude
    pub latitude: f64,
    /// Cell centre longitude
    pub longitude: f64,
    /// Radius searched around the centre, in metres
    pub search_radius_m: u32,
}

impl GridPoint {
    /// Cell centre as coordinates.
    #[must_use]
    pub const fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

/// Estimated outbound calls for a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCallEstimate {
    /// Place-search calls (two per point)
    pub place_calls: usize,
    /// Search-results API calls (one per point)
    pub serp_calls: usize,
}

/// Generate search points covering a circle of `radius_km` around `center`.
///
/// Points are returned row-major, south to north and west to east. The
/// output is deterministic for identical inputs.
pub fn generate_grid(
    center: Coordinates,
    radius_km: f64,
    overlap_factor: f64,
) -> Result<Vec<GridPoint>, GeoError> {
    if !radius_km.is_finite() || radius_km <= 0.0 {
        return Err(GeoError::InvalidRadius(radius_km));
    }

    let overlap = if overlap_factor.is_nan() {
        0.0
    } else {
        overlap_factor.clamp(0.0, 0.5)
    };
    let cell_radius_km = radius_km.min(MAX_CELL_RADIUS_KM);
    let step_km = cell_radius_km * 2.0 * (1.0 - overlap);

    if radius_km <= cell_radius_km {
        tracing::debug!(
            "Single-cell grid at ({:.4}, {:.4}) r={:.1}km",
            center.latitude,
            center.longitude,
            radius_km
        );
        return Ok(vec![GridPoint {
            latitude: center.latitude,
            longitude: center.longitude,
            search_radius_m: radius_m(radius_km),
        }]);
    }

    #[allow(clippy::cast_possible_truncation)]
    let steps = (radius_km / step_km).ceil() as i64;
    let keep_within_km = radius_km + cell_radius_km * 0.5;
    let lng_scale = EARTH_RADIUS_KM * center.latitude.to_radians().cos();
    let cell_radius_m = radius_m(cell_radius_km);

    let mut points = Vec::new();
    for row in -steps..=steps {
        #[allow(clippy::cast_precision_loss)]
        let lat = center.latitude + (row as f64 * step_km / EARTH_RADIUS_KM).to_degrees();
        for col in -steps..=steps {
            #[allow(clippy::cast_precision_loss)]
            let lng = center.longitude + (col as f64 * step_km / lng_scale).to_degrees();
            let candidate = Coordinates::new(lat, lng);
            if distance_km(center, candidate) <= keep_within_km {
                points.push(GridPoint {
                    latitude: lat,
                    longitude: lng,
                    search_radius_m: cell_radius_m,
                });
            }
        }
    }

    tracing::debug!(
        "Generated grid: {} points covering {:.1}km radius from ({:.4}, {:.4}), step={:.2}km",
        points.len(),
        radius_km,
        center.latitude,
        center.longitude,
        step_km
    );
    Ok(points)
}

/// Estimate outbound calls for a grid of `point_count` cells.
#[must_use]
pub const fn estimate_api_calls(point_count: usize) -> ApiCallEstimate {
    ApiCallEstimate {
        place_calls: point_count * 2,
        serp_calls: point_count,
    }
}

/// Estimate the USD cost of a grid of `point_count` cells, rounded to 4 decimals.
#[must_use]
pub fn estimate_cost_usd(point_count: usize) -> f64 {
    let calls = estimate_api_calls(point_count);
    #[allow(clippy::cast_precision_loss)]
    let cost = calls.place_calls as f64 * PLACE_CALL_COST_USD
        + calls.serp_calls as f64 * SERP_CALL_COST_USD;
    (cost * 10_000.0).round() / 10_000.0
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn radius_m(km: f64) -> u32 {
    (km * 1000.0) as u32
}
