//! Merge behaviour over mixed-source record sets.

use leadgrid_core::{Coordinates, Lead, LeadSource};
use leadgrid_dedup::merge;

const AUSTIN: Coordinates = Coordinates::new(30.2672, -97.7431);

fn pizza_records() -> Vec<Lead> {
    let mut browser = Lead::new("ChIJ_abc123", LeadSource::Playwright, "Joe's Pizza");
    browser.address = Some("123 Main St, Austin, TX".to_string());
    browser.price_level = Some(2);
    browser.coordinates = Some(AUSTIN);
    browser.types = vec!["pizza".to_string()];

    let mut serp = Lead::new("ChIJ_abc123", LeadSource::SerpApi, "Joe's Pizza");
    serp.price_level = Some(3);
    serp.opening_hours = Some("Mon-Sun 11am-10pm".to_string());
    serp.types = vec!["pizza".to_string(), "restaurant".to_string()];
    serp.photos = vec!["https://img.example/joes.jpg".to_string()];

    let mut other = Lead::new("ChIJ_def456", LeadSource::Playwright, "Tacos Locos");
    other.coordinates = Some(Coordinates::new(30.2700, -97.7500));

    vec![browser, serp, other]
}

fn find<'a>(leads: &'a [Lead], id: &str) -> &'a Lead {
    leads
        .iter()
        .find(|lead| lead.source_id == id)
        .unwrap_or_else(|| panic!("missing {id}"))
}

#[test]
fn test_shared_identifier_collapses_to_one_record() {
    let merged = merge(pizza_records());
    assert_eq!(merged.len(), 2);

    let joes = find(&merged, "ChIJ_abc123");
    assert_eq!(joes.opening_hours.as_deref(), Some("Mon-Sun 11am-10pm"));
    assert_eq!(joes.price_level, Some(2));
    assert_eq!(joes.types, vec!["pizza", "restaurant"]);
    assert_eq!(joes.photos.len(), 1);
    assert_eq!(joes.source_tag(), "playwright+serp_api");
}

#[test]
fn test_output_keeps_first_acceptance_order() {
    let merged = merge(pizza_records());
    let ids: Vec<&str> = merged.iter().map(|lead| lead.source_id.as_str()).collect();
    assert_eq!(ids, vec!["ChIJ_abc123", "ChIJ_def456"]);
}

#[test]
fn test_fuzzy_match_fills_missing_fields() {
    let mut known = Lead::new("ChIJmcd", LeadSource::SerpApi, "McDonald's");
    known.phone = Some("+1-555-0001".to_string());
    known.coordinates = Some(AUSTIN);

    let mut orphan = Lead::new("pw_0123456789abcdef", LeadSource::Playwright, "McDonalds");
    orphan.website = Some("https://mcdonalds.com".to_string());
    orphan.coordinates = Some(AUSTIN);

    let merged = merge(vec![known, orphan]);
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].source_id, "ChIJmcd");
    assert_eq!(merged[0].website.as_deref(), Some("https://mcdonalds.com"));
    assert_eq!(merged[0].phone.as_deref(), Some("+1-555-0001"));
}

#[test]
fn test_similar_names_far_apart_stay_separate() {
    let mut a = Lead::new("ChIJsb1", LeadSource::Playwright, "Starbucks");
    a.coordinates = Some(AUSTIN);
    let mut b = Lead::new("pw_0123456789abcdef", LeadSource::Playwright, "Starbucks");
    b.coordinates = Some(Coordinates::new(31.0, -97.0));

    assert_eq!(merge(vec![a, b]).len(), 2);
}

#[test]
fn test_different_identifier_formats_merge_across() {
    let mut feature = Lead::new("0x8644b5a0e9bfc1c9:0x8f5b2f2d2e6c1f43", LeadSource::SerpApi, "Jo's Coffee");
    feature.coordinates = Some(AUSTIN);
    feature.rating = Some(4.6);

    let mut place = Lead::new("ChIJjos", LeadSource::Playwright, "Jo's  Coffee");
    place.coordinates = Some(Coordinates::new(30.26722, -97.74312));
    place.phone = Some("(512) 444-3800".to_string());

    let merged = merge(vec![feature, place]);
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].source_id, "ChIJjos");
    assert_eq!(merged[0].rating, Some(4.6));
    assert_eq!(merged[0].phone.as_deref(), Some("(512) 444-3800"));
    assert_eq!(merged[0].source_tag(), "playwright+serp_api");
}

#[test]
fn test_near_exact_names_merge_without_coordinates() {
    let a = Lead::new("0x1:0x2", LeadSource::SerpApi, "Franklin Barbecue");
    let b = Lead::new("ChIJfrank", LeadSource::Playwright, "FRANKLIN BARBECUE");
    let merged = merge(vec![a, b]);
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].source_id, "ChIJfrank");
}

#[test]
fn test_dropped_apostrophe_merges_without_coordinates() {
    let mut listed = Lead::new("ChIJjoes", LeadSource::Playwright, "Joe's Pizza");
    listed.coordinates = Some(AUSTIN);
    let mut scraped = Lead::new("pw_0123456789abcdef", LeadSource::Playwright, "Joes Pizza");
    scraped.phone = Some("+1 512-555-0100".to_string());

    let merged = merge(vec![listed, scraped]);
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].source_id, "ChIJjoes");
    assert_eq!(merged[0].phone.as_deref(), Some("+1 512-555-0100"));
}

#[test]
fn test_stored_enrichment_survives_new_browser_records() {
    let mut stored = Lead::new("ChIJjos", LeadSource::Playwright, "Jo's Coffee");
    stored.sources.insert(LeadSource::Outscraper);
    stored.primary_email = Some("hello@jos.example".to_string());
    stored.emails = vec!["hello@jos.example".to_string()];
    stored.raw = Some(serde_json::json!({"origin": "stored"}));

    let mut fresh = Lead::new("ChIJjos", LeadSource::Playwright, "Jo's Coffee");
    fresh.primary_email = Some("scraped@jos.example".to_string());
    fresh.raw = Some(serde_json::json!({"origin": "fresh"}));

    let merged = merge(vec![stored, fresh]);
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].primary_email.as_deref(), Some("hello@jos.example"));
    assert_eq!(merged[0].emails.len(), 1);
    assert_eq!(merged[0].raw, Some(serde_json::json!({"origin": "stored"})));
}

#[test]
fn test_merging_is_repeatable() {
    let first = merge(pizza_records());
    let again = merge(first.clone());
    assert_eq!(first, again);
}
