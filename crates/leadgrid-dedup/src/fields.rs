//! Field-level merge policy.

use leadgrid_core::Lead;
use std::collections::BTreeMap;

fn fill<T>(field: &mut Option<T>, value: Option<T>) {
    if field.is_none() {
        *field = value;
    }
}

fn prefer<T>(field: &mut Option<T>, value: Option<T>, outranks: bool) {
    if value.is_some() && (outranks || field.is_none()) {
        *field = value;
    }
}

fn union<T: PartialEq>(list: &mut Vec<T>, incoming: Vec<T>) {
    for item in incoming {
        if !list.contains(&item) {
            list.push(item);
        }
    }
}

fn prefer_list<T: PartialEq>(list: &mut Vec<T>, mut incoming: Vec<T>, outranks: bool) {
    if outranks && !incoming.is_empty() {
        union(&mut incoming, std::mem::take(list));
        *list = incoming;
    } else {
        union(list, incoming);
    }
}

fn prefer_map(map: &mut BTreeMap<String, String>, incoming: BTreeMap<String, String>, outranks: bool) {
    for (key, value) in incoming {
        if value.trim().is_empty() {
            continue;
        }
        if outranks {
            map.insert(key, value);
        } else {
            map.entry(key).or_insert(value);
        }
    }
}

/// Fold `incoming` into `existing`.
///
/// - Ordinary fields are only filled when empty.
/// - `types` and `photos` grow by union, keeping existing order.
/// - Contact fields (`primary_email`, `emails`, `social_links`, `owner_name`,
///   `employee_count`, `year_established`, `business_age_years`) take the
///   incoming value when its source authority is strictly higher; otherwise
///   they are filled like ordinary fields.
/// - The identifier is replaced by a higher-preference format.
/// - Sources are unioned.
pub fn merge_into(existing: &mut Lead, incoming: Lead) {
    let outranks = incoming.authority() > existing.authority();
    let upgrade_id = incoming.id_kind().preference() > existing.id_kind().preference();

    let Lead {
        source_id,
        sources,
        name,
        address,
        phone,
        website,
        rating,
        review_count,
        category,
        types,
        coordinates,
        opening_hours,
        photos,
        price_level,
        status,
        maps_url,
        description,
        verified,
        rating_breakdown,
        primary_email,
        emails,
        social_links,
        owner_name,
        employee_count,
        year_established,
        business_age_years,
        raw,
    } = incoming;

    if upgrade_id {
        existing.source_id = source_id;
    }
    existing.sources.extend(sources);

    if existing.name.trim().is_empty() {
        existing.name = name;
    }
    fill(&mut existing.address, address);
    fill(&mut existing.phone, phone);
    fill(&mut existing.website, website);
    fill(&mut existing.rating, rating);
    fill(&mut existing.review_count, review_count);
    fill(&mut existing.category, category);
    union(&mut existing.types, types);
    fill(&mut existing.coordinates, coordinates);
    fill(&mut existing.opening_hours, opening_hours);
    union(&mut existing.photos, photos);
    fill(&mut existing.price_level, price_level);
    fill(&mut existing.status, status);
    fill(&mut existing.maps_url, maps_url);
    fill(&mut existing.description, description);
    fill(&mut existing.verified, verified);
    fill(&mut existing.rating_breakdown, rating_breakdown);
    fill(&mut existing.raw, raw);

    prefer(
        &mut existing.primary_email,
        primary_email.filter(|email| !email.trim().is_empty()),
        outranks,
    );
    prefer_list(&mut existing.emails, emails, outranks);
    prefer_map(&mut existing.social_links, social_links, outranks);
    prefer(
        &mut existing.owner_name,
        owner_name.filter(|owner| !owner.trim().is_empty()),
        outranks,
    );
    prefer(&mut existing.employee_count, employee_count, outranks);
    prefer(&mut existing.year_established, year_established, outranks);
    prefer(&mut existing.business_age_years, business_age_years, outranks);
}
