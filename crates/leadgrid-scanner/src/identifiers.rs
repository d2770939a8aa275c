//! Identifier and coordinate extraction from listing links.

use leadgrid_core::Coordinates;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

/// Prefix of content-hash identifiers.
pub const SYNTHETIC_PREFIX: &str = "pw_";

static FEATURE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(0x[0-9a-fA-F]+:0x[0-9a-fA-F]+)").expect("valid regex"));

static PLACE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(ChIJ[A-Za-z0-9_-]+)").expect("valid regex"));

static AT_COORDINATES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"@(-?\d+(?:\.\d+)?),(-?\d+(?:\.\d+)?)").expect("valid regex")
});

static DATA_COORDINATES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"!3d(-?\d+(?:\.\d+)?)!4d(-?\d+(?:\.\d+)?)").expect("valid regex")
});

/// Resolve a high-confidence identifier embedded in a listing link.
///
/// Detail links carry the hex feature token in their `data=` segment, and
/// some carry a `ChIJ` place token as a query parameter. Returns `None` when
/// neither format is present.
#[must_use]
pub fn resolve_source_id(href: &str) -> Option<String> {
    if let Some(found) = PLACE_ID.captures(href) {
        return Some(found[1].to_string());
    }
    FEATURE_ID
        .captures(href)
        .map(|found| found[1].to_string())
}

/// Parse coordinates embedded in a link.
///
/// The pin position (`!3d<lat>!4d<lng>`) takes precedence over the viewport
/// centre (`@lat,lng`).
#[must_use]
pub fn parse_coordinates(href: &str) -> Option<Coordinates> {
    let captures = DATA_COORDINATES
        .captures(href)
        .or_else(|| AT_COORDINATES.captures(href))?;
    let latitude: f64 = captures[1].parse().ok()?;
    let longitude: f64 = captures[2].parse().ok()?;
    Coordinates::checked(latitude, longitude).ok()
}

/// Deterministic low-confidence identifier for a listing without one.
#[must_use]
pub fn synthetic_id(name: &str, address: Option<&str>, link: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update(b"|");
    hasher.update(address.unwrap_or_default().as_bytes());
    hasher.update(b"|");
    hasher.update(link.unwrap_or_default().as_bytes());
    let digest = hasher.finalize();

    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("{SYNTHETIC_PREFIX}{}", &hex[..16])
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadgrid_core::IdKind;

    const DETAIL_LINK: &str = "https://www.google.com/maps/place/Jo's+Coffee/data=!4m7!3m6!1s0x8644b5a0b9f6b5d7:0x1a2b3c4d5e6f7081!8m2!3d30.2500785!4d-97.7494326!16s%2Fg%2F1tfz7m0p?authuser=0&hl=en";

    #[test]
    fn test_feature_id_from_detail_link() {
        assert_eq!(
            resolve_source_id(DETAIL_LINK).as_deref(),
            Some("0x8644b5a0b9f6b5d7:0x1a2b3c4d5e6f7081")
        );
    }

    #[test]
    fn test_place_id_preferred_over_feature_id() {
        let link = format!("{DETAIL_LINK}&query_place_id=ChIJa1b2c3d4E5f6");
        assert_eq!(resolve_source_id(&link).as_deref(), Some("ChIJa1b2c3d4E5f6"));
    }

    #[test]
    fn test_unresolvable_link() {
        assert_eq!(resolve_source_id("https://www.google.com/maps?cid=12345"), None);
        assert_eq!(resolve_source_id(""), None);
    }

    #[test]
    fn test_parse_pin_coordinates() {
        let coords = parse_coordinates(DETAIL_LINK).expect("coordinates");
        assert!((coords.latitude - 30.250_078_5).abs() < 1e-9);
        assert!((coords.longitude + 97.749_432_6).abs() < 1e-9);
    }

    #[test]
    fn test_parse_viewport_coordinates() {
        let coords = parse_coordinates("https://www.google.com/maps/place/X/@30.26,-97.74,17z")
            .expect("coordinates");
        assert!((coords.latitude - 30.26).abs() < 1e-9);
        assert!(parse_coordinates("https://www.google.com/maps/place/X").is_none());
        assert!(parse_coordinates("https://x/@95.0,10.0,17z").is_none());
    }

    #[test]
    fn test_synthetic_id_is_deterministic() {
        let a = synthetic_id("Jo's Coffee", Some("1300 S Congress"), None);
        let b = synthetic_id("Jo's Coffee", Some("1300 S Congress"), None);
        let c = synthetic_id("Jo's Coffee", None, None);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), SYNTHETIC_PREFIX.len() + 16);
        assert_eq!(IdKind::classify(&a), IdKind::Synthetic);
    }
}
