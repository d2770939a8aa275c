//! Fuzzy identity checks between two records.

use leadgrid_core::{distance_km, Lead};
use rapidfuzz::fuzz;

/// Thresholds for deciding that two records are the same business.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchPolicy {
    /// Minimum name similarity (0-100) when both records have coordinates
    pub name_threshold: f64,
    /// Minimum name similarity (0-100) when either record lacks coordinates
    pub strict_name_threshold: f64,
    /// Maximum distance between matching records, in kilometres
    pub proximity_km: f64,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            name_threshold: 85.0,
            strict_name_threshold: 95.0,
            proximity_km: 0.05,
        }
    }
}

impl MatchPolicy {
    /// Whether `a` and `b` likely describe the same business.
    #[must_use]
    pub fn is_match(&self, a: &Lead, b: &Lead) -> bool {
        let Some(score) = name_similarity(&a.name, &b.name) else {
            return false;
        };
        if score < self.name_threshold {
            return false;
        }

        match (a.coordinates, b.coordinates) {
            (Some(pa), Some(pb)) => distance_km(pa, pb) <= self.proximity_km,
            _ => score >= self.strict_name_threshold,
        }
    }
}

/// Lowercase and collapse whitespace.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Similarity of two business names on a 0-100 scale.
///
/// The score is the indel ratio `2 * lcs / (len_a + len_b)` over characters.
/// Returns `None` when either name is blank; a blank name matches nothing.
#[must_use]
pub fn name_similarity(a: &str, b: &str) -> Option<f64> {
    let a = normalize_name(a);
    let b = normalize_name(b);
    if a.is_empty() || b.is_empty() {
        return None;
    }
    Some(fuzz::ratio(a.chars(), b.chars()) * 100.0)
}
