//! The three-phase merge.

use crate::fields::merge_into;
use crate::matching::MatchPolicy;
use leadgrid_core::Lead;
use std::collections::HashMap;

/// Merge records with the default [`MatchPolicy`].
#[must_use]
pub fn merge(records: Vec<Lead>) -> Vec<Lead> {
    merge_with(records, &MatchPolicy::default())
}

/// Merge records that describe the same business.
///
/// Output order is the order in which each business was first accepted:
/// identifier-grouped records first, then fuzzy-matched ones. Matching is
/// greedy, so feeding the same records in the same order always yields the
/// same result.
#[must_use]
pub fn merge_with(records: Vec<Lead>, policy: &MatchPolicy) -> Vec<Lead> {
    if records.is_empty() {
        return Vec::new();
    }
    let input = records.len();

    let (mut accepted, orphans) = group_by_identifier(records);
    let grouped = accepted.len();
    let orphan_count = orphans.len();

    let mut fuzzy_merged = 0usize;
    for orphan in orphans {
        match accepted.iter_mut().find(|existing| policy.is_match(existing, &orphan)) {
            Some(existing) => {
                tracing::debug!(
                    "Dedup fuzzy match: '{}' merged into '{}' ({})",
                    orphan.name,
                    existing.name,
                    existing.source_id
                );
                merge_into(existing, orphan);
                fuzzy_merged += 1;
            }
            None => accepted.push(orphan),
        }
    }

    let before_cross = accepted.len();
    let merged = merge_across_formats(accepted, policy);

    tracing::info!(
        "Dedup: {} records -> {} unique ({} by identifier, {} of {} orphans fuzzy-merged, {} cross-format)",
        input,
        merged.len(),
        grouped,
        fuzzy_merged,
        orphan_count,
        before_cross - merged.len()
    );
    merged
}

/// Split records into identifier groups and records without a usable identifier.
fn group_by_identifier(records: Vec<Lead>) -> (Vec<Lead>, Vec<Lead>) {
    let mut groups: Vec<Lead> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut orphans = Vec::new();

    for record in records {
        if !record.id_kind().is_high_confidence() {
            orphans.push(record);
            continue;
        }
        let key = record.source_id.trim().to_string();
        match index.get(&key) {
            Some(&position) => {
                tracing::debug!(
                    "Dedup identifier match: '{}' merged ({})",
                    record.name,
                    key
                );
                merge_into(&mut groups[position], record);
            }
            None => {
                index.insert(key, groups.len());
                groups.push(record);
            }
        }
    }

    (groups, orphans)
}

/// Collapse records whose identifiers use different formats but match by
/// name and location.
fn merge_across_formats(records: Vec<Lead>, policy: &MatchPolicy) -> Vec<Lead> {
    let mut kept: Vec<Lead> = Vec::with_capacity(records.len());
    for record in records {
        let kind = record.id_kind();
        let target = kept
            .iter_mut()
            .find(|existing| existing.id_kind() != kind && policy.is_match(existing, &record));
        match target {
            Some(existing) => {
                tracing::debug!(
                    "Dedup cross-format match: {} merged into {}",
                    record.source_id,
                    existing.source_id
                );
                merge_into(existing, record);
            }
            None => kept.push(record),
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadgrid_core::{Coordinates, LeadSource};

    #[test]
    fn test_empty_input() {
        assert!(merge(Vec::new()).is_empty());
    }

    #[test]
    fn test_synthetic_ids_are_never_grouped_exactly() {
        let a = Lead::new("pw_0123456789abcdef", LeadSource::Playwright, "Alpha Bakery");
        let b = Lead::new("pw_0123456789abcdef", LeadSource::Playwright, "Zulu Garage");
        assert_eq!(merge(vec![a, b]).len(), 2);
    }

    #[test]
    fn test_same_format_records_keep_identities() {
        let here = Coordinates::new(30.2672, -97.7431);
        let mut a = Lead::new("ChIJone", LeadSource::Playwright, "Starbucks");
        a.coordinates = Some(here);
        let mut b = Lead::new("ChIJtwo", LeadSource::SerpApi, "Starbucks");
        b.coordinates = Some(here);
        assert_eq!(merge(vec![a, b]).len(), 2);
    }
}
