//! The normalized lead record shared by every collector and the merge engine.

use crate::error::{CoreError, GeoError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

static PLACE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ChIJ[A-Za-z0-9_-]+$").expect("valid regex"));

static FEATURE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]+:0x[0-9a-fA-F]+$").expect("valid regex"));

static SYNTHETIC_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^pw_[0-9a-f]{16}$").expect("valid regex"));

/// Star rating (1-5) to review count.
pub type RatingBreakdown = BTreeMap<u8, u32>;

/// A WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
}

impl Coordinates {
    /// Create coordinates without range checks.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Create coordinates, rejecting values outside the valid lat/lng ranges.
    pub fn checked(latitude: f64, longitude: f64) -> Result<Self, GeoError> {
        if (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude) {
            Ok(Self::new(latitude, longitude))
        } else {
            Err(GeoError::InvalidCoordinates {
                latitude,
                longitude,
            })
        }
    }
}

/// Where a lead record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadSource {
    /// Browser-driven collector (primary)
    Playwright,
    /// Search-results API (supplementary)
    SerpApi,
    /// Contact enrichment API
    Outscraper,
}

impl LeadSource {
    /// Stable name used in source tags and the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Playwright => "playwright",
            Self::SerpApi => "serp_api",
            Self::Outscraper => "outscraper",
        }
    }

    /// Authority rank: enrichment > supplementary > primary.
    #[must_use]
    pub const fn authority(self) -> u8 {
        match self {
            Self::Playwright => 1,
            Self::SerpApi => 2,
            Self::Outscraper => 3,
        }
    }
}

impl fmt::Display for LeadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadSource {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "playwright" => Ok(Self::Playwright),
            "serp_api" => Ok(Self::SerpApi),
            "outscraper" => Ok(Self::Outscraper),
            other => Err(CoreError::Validation(format!("unknown lead source '{other}'"))),
        }
    }
}

/// Format of a lead's source identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    /// Short alphanumeric place token (`ChIJ...`)
    PlaceId,
    /// Hex coordinate-pair feature token (`0x...:0x...`)
    FeatureId,
    /// Content-hash identifier assigned by the primary collector (`pw_...`)
    Synthetic,
    /// Anything else, including empty identifiers
    Unrecognized,
}

impl IdKind {
    /// Classify an identifier by its format.
    #[must_use]
    pub fn classify(id: &str) -> Self {
        let id = id.trim();
        if PLACE_ID.is_match(id) {
            Self::PlaceId
        } else if FEATURE_ID.is_match(id) {
            Self::FeatureId
        } else if SYNTHETIC_ID.is_match(id) {
            Self::Synthetic
        } else {
            Self::Unrecognized
        }
    }

    /// Whether this format is eligible for exact-match grouping.
    #[must_use]
    pub const fn is_high_confidence(self) -> bool {
        matches!(self, Self::PlaceId | Self::FeatureId)
    }

    /// Preference when two identifiers compete for the same record.
    #[must_use]
    pub const fn preference(self) -> u8 {
        match self {
            Self::PlaceId => 2,
            Self::FeatureId => 1,
            Self::Synthetic | Self::Unrecognized => 0,
        }
    }
}

/// One normalized business record.
///
/// Before merging a lead carries a single source; after merging `sources`
/// holds every contributor. Optional fields are `None` (or empty) until some
/// source populates them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    /// Source-assigned or synthetic identifier
    pub source_id: String,
    /// Every source that contributed to this record
    pub sources: BTreeSet<LeadSource>,

    /// Business name
    pub name: String,
    /// Postal address
    pub address: Option<String>,
    /// Phone number as displayed
    pub phone: Option<String>,
    /// Website URL
    pub website: Option<String>,
    /// Average rating (0-5)
    pub rating: Option<f64>,
    /// Number of reviews
    pub review_count: Option<u32>,
    /// Primary category
    pub category: Option<String>,
    /// All category tags
    pub types: Vec<String>,
    /// Position of the business
    pub coordinates: Option<Coordinates>,
    /// Opening hours text
    pub opening_hours: Option<String>,
    /// Photo URLs
    pub photos: Vec<String>,
    /// Price tier (number of `$`)
    pub price_level: Option<u8>,
    /// Operational status (e.g. `OPERATIONAL`)
    pub status: Option<String>,
    /// Canonical listing URL
    pub maps_url: Option<String>,
    /// Editorial description
    pub description: Option<String>,
    /// Claimed/verified badge
    pub verified: Option<bool>,
    /// Review counts per star rating
    pub rating_breakdown: Option<RatingBreakdown>,

    /// Main contact email
    pub primary_email: Option<String>,
    /// All known emails
    pub emails: Vec<String>,
    /// Social network name to profile URL
    pub social_links: BTreeMap<String, String>,
    /// Owner or manager name
    pub owner_name: Option<String>,
    /// Headcount
    pub employee_count: Option<u32>,
    /// Founding year
    pub year_established: Option<i32>,
    /// Age of the business in years
    pub business_age_years: Option<u32>,

    /// Unmodified payload from the source
    pub raw: Option<serde_json::Value>,
}

impl Lead {
    /// Create a record with identity and name set; everything else empty.
    #[must_use]
    pub fn new(source_id: impl Into<String>, source: LeadSource, name: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            sources: BTreeSet::from([source]),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Format of this record's identifier.
    #[must_use]
    pub fn id_kind(&self) -> IdKind {
        IdKind::classify(&self.source_id)
    }

    /// Highest authority rank among this record's sources.
    #[must_use]
    pub fn authority(&self) -> u8 {
        self.sources
            .iter()
            .map(|s| s.authority())
            .max()
            .unwrap_or(0)
    }

    /// Sorted, `+`-joined source names (e.g. `playwright+serp_api`).
    #[must_use]
    pub fn source_tag(&self) -> String {
        let mut names: Vec<&str> = self.sources.iter().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names.join("+")
    }

    /// Parse a tag produced by [`Lead::source_tag`].
    pub fn parse_source_tag(tag: &str) -> Result<BTreeSet<LeadSource>, CoreError> {
        tag.split('+')
            .filter(|part| !part.is_empty())
            .map(LeadSource::from_str)
            .collect()
    }
}
