use crate::identifiers::{parse_coordinates, resolve_source_id};
use crate::parser::{clean_text, first_text, prefer_id, select_all, select_first, Listing};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;

/// Element that marks a rendered detail view.
pub const DETAIL_READY_SELECTOR: &str = "div[role=\"main\"]";

const PHONE_SELECTOR: &str = "button[data-item-id^=\"phone:tel\"] div.fontBodyMedium";
const WEBSITE_SELECTOR: &str = "a[data-item-id=\"authority\"] div.fontBodyMedium";
const ADDRESS_SELECTOR: &str = "button[data-item-id=\"address\"] div.fontBodyMedium";
const HOURS_SELECTOR: &str =
    "div[aria-label*=\"Monday\"], div[aria-label*=\"Sunday\"], div[aria-label*=\"hour\"]";
const PRICE_SELECTOR: &str = "button[jsaction*=\"category\"]";
const DESCRIPTION_SELECTOR: &str = "div.PYvSYb, div[class*=\"editorial\"] span";

static PRICE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\$+)").expect("valid regex"));

static STAR_REVIEWS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d[\d,]*)\s*review").expect("valid regex"));

/// Fill in a listing from its rendered detail view.
///
/// Only empty fields are filled. The identifier and coordinates are
/// upgraded from `final_url` when it carries better ones.
pub fn apply_detail(listing: &mut Listing, html: &str, final_url: &str) {
    let document = Html::parse_document(html);
    let lead = &mut listing.lead;

    if lead.phone.is_none() {
        lead.phone = first_text(&document, PHONE_SELECTOR);
    }

    if lead.website.is_none() {
        lead.website = first_text(&document, WEBSITE_SELECTOR).map(|site| {
            if site.starts_with("http") {
                site
            } else {
                format!("https://{site}")
            }
        });
    }

    // The detail view shows the full address; the feed one is abbreviated.
    if let Some(address) = first_text(&document, ADDRESS_SELECTOR) {
        lead.address = Some(address);
    }

    if lead.opening_hours.is_none() {
        lead.opening_hours = select_first(&document, HOURS_SELECTOR)
            .and_then(|el| el.value().attr("aria-label"))
            .map(|label| label.trim().to_string())
            .filter(|label| !label.is_empty());
    }

    if lead.price_level.is_none() {
        lead.price_level = select_all(&document, PRICE_SELECTOR)
            .into_iter()
            .map(clean_text)
            .find_map(|text| {
                PRICE
                    .captures(&text)
                    .and_then(|c| u8::try_from(c[1].len()).ok())
            });
    }

    if lead.description.is_none() {
        lead.description = select_all(&document, DESCRIPTION_SELECTOR)
            .into_iter()
            .map(clean_text)
            .find(|text| text.chars().count() > 10);
    }

    if lead.verified.is_none() {
        let claimed = select_all(&document, "span")
            .into_iter()
            .map(clean_text)
            .any(|text| text == "Claimed" || text == "Verified");
        if claimed {
            lead.verified = Some(true);
        }
    }

    if lead.rating_breakdown.is_none() {
        let breakdown: leadgrid_core::RatingBreakdown = (1..=5u8)
            .filter_map(|stars| {
                let selector = format!("tr[aria-label*=\"{stars} star\"]");
                let label = select_first(&document, &selector)?
                    .value()
                    .attr("aria-label")?
                    .to_string();
                let count = STAR_REVIEWS
                    .captures(&label)?
                    .get(1)?
                    .as_str()
                    .replace(',', "")
                    .parse::<u32>()
                    .ok()?;
                Some((stars, count))
            })
            .collect();
        if !breakdown.is_empty() {
            lead.rating_breakdown = Some(breakdown);
        }
    }

    if lead.owner_name.is_none() {
        lead.owner_name = select_all(&document, "span")
            .into_iter()
            .map(clean_text)
            .find_map(|text| {
                ["Managed by", "Owner"].iter().find_map(|prefix| {
                    text.strip_prefix(prefix)
                        .map(|rest| rest.trim_start_matches(':').trim().to_string())
                        .filter(|rest| !rest.is_empty())
                })
            });
    }

    if let Some(id) = resolve_source_id(final_url) {
        if prefer_id(&lead.source_id, &id) {
            tracing::debug!("Upgraded id {} -> {}", lead.source_id, id);
            lead.source_id = id;
        }
    }
    if let Some(coordinates) = parse_coordinates(final_url) {
        lead.coordinates = Some(coordinates);
    }
}
