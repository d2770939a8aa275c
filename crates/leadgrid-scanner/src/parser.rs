use crate::identifiers::{parse_coordinates, resolve_source_id, synthetic_id};
use leadgrid_core::{IdKind, Lead, LeadSource};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;

pub const FEED_SELECTOR: &str = "div[role=\"feed\"]";
pub const FEED_ITEM_SELECTOR: &str = "div[role=\"feed\"] > div > div[jsaction]";
pub const END_MARKER_SELECTOR: &str = "p.fontBodyMedium span";
pub const END_MARKER_TEXT: &str = "end of results";

const MAPS_ORIGIN: &str = "https://www.google.com";

const LINK_SELECTORS: &str = "div[role=\"feed\"] a[href*=\"/maps/place/\"], \
     div[role=\"feed\"] a[href*=\"google.com/maps/place\"], \
     div[role=\"feed\"] a[href*=\"/maps?cid=\"]";
const FALLBACK_LINK_SELECTORS: &str =
    "div[role=\"feed\"] a.hfpxzc, div[role=\"feed\"] a[href*=\"/maps/\"]";

/// A listing parsed from the results feed, before detail enrichment.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub lead: Lead,
    /// Absolute link to the detail view
    pub link: String,
}

impl Listing {
    /// Assign a synthetic identifier if no high-confidence one was found.
    pub fn into_lead(self) -> Lead {
        let mut lead = self.lead;
        if !lead.id_kind().is_high_confidence() {
            lead.source_id = synthetic_id(&lead.name, lead.address.as_deref(), Some(&self.link));
        }
        lead
    }
}

static RATING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+(?:[.,]\d+)?)").expect("valid regex"));

static REVIEW_COUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\((\d[\d,]*)\)|(\d[\d,]*)\s*review").expect("valid regex")
});

/// Parse `"4.5 stars 1,234 Reviews"` style labels into rating and count.
///
/// A leading number above 5 is not a rating.
pub fn parse_rating_text(text: &str) -> (Option<f64>, Option<u32>) {
    let rating = RATING
        .captures(text)
        .and_then(|c| c[1].replace(',', ".").parse::<f64>().ok())
        .filter(|r| (0.0..=5.0).contains(r));

    let count = REVIEW_COUNT.captures(text).and_then(|c| {
        c.get(1)
            .or_else(|| c.get(2))
            .and_then(|m| m.as_str().replace(',', "").parse::<u32>().ok())
    });

    (rating, count)
}

/// Parse the listings currently rendered in the results feed.
///
/// Listings are returned in feed order, de-duplicated by link and truncated
/// to `max_results`. A listing that cannot be parsed is skipped.
pub fn parse_feed(html: &str, max_results: usize) -> Vec<Listing> {
    let document = Html::parse_document(html);

    let mut links: Vec<ElementRef> = select_all(&document, LINK_SELECTORS);
    if links.is_empty() {
        links = select_all(&document, FALLBACK_LINK_SELECTORS);
    }

    let mut seen = HashSet::new();
    let mut listings = Vec::new();
    for link in links {
        if listings.len() >= max_results {
            break;
        }
        let Some(listing) = parse_listing(link) else {
            continue;
        };
        if seen.insert(listing.link.clone()) {
            listings.push(listing);
        }
    }

    tracing::debug!("Parsed {} listings from feed", listings.len());
    listings
}

fn parse_listing(link: ElementRef) -> Option<Listing> {
    let href = absolute_link(link.value().attr("href")?);
    let container = listing_container(link);

    let aria_label = link
        .value()
        .attr("aria-label")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let name = aria_label
        .clone()
        .or_else(|| container.and_then(|c| first_text(c, "div.qBF1Pd")))
        .or_else(|| Some(clean_text(link)).filter(|s| !s.is_empty()))?;

    let mut lead = Lead::new(
        resolve_source_id(&href).unwrap_or_default(),
        LeadSource::Playwright,
        name,
    );
    lead.coordinates = parse_coordinates(&href);
    lead.maps_url = Some(href.clone());

    if let Some(container) = container {
        lead.category = category(container);
        if let Some(category) = &lead.category {
            lead.types.push(category.clone());
        }

        let rating_label = select_first(container, "span[role=\"img\"]")
            .and_then(|el| el.value().attr("aria-label").map(str::to_string));
        let (rating, count) = rating_label
            .as_deref()
            .map_or((None, None), parse_rating_text);
        lead.rating = rating;
        lead.review_count = count.or_else(|| parse_rating_text(&clean_text(container)).1);

        lead.address = address(container, lead.category.as_deref());
    }

    lead.raw = Some(serde_json::json!({
        "aria_label": aria_label,
        "href": href,
    }));

    Some(Listing { lead, link: href })
}

/// Nearest ancestor that holds one whole listing card.
fn listing_container(link: ElementRef) -> Option<ElementRef> {
    let ancestors = || link.ancestors().filter_map(ElementRef::wrap);
    ancestors()
        .find(|el| {
            el.value()
                .attr("jsaction")
                .is_some_and(|a| a.contains("mouseover"))
        })
        .or_else(|| ancestors().find(|el| el.value().classes().any(|c| c == "Nv2PK")))
}

fn category(container: ElementRef) -> Option<String> {
    select_all(container, "div.fontBodyMedium > div > span > span")
        .into_iter()
        .chain(select_all(container, "div.W4Efsd span"))
        .map(clean_text)
        .map(|s| s.trim_matches(|c: char| c == '·' || c.is_whitespace()).to_string())
        .find(|s| !s.is_empty() && s.parse::<f64>().is_err())
}

fn address(container: ElementRef, category: Option<&str>) -> Option<String> {
    let rows = select_all(container, "div.fontBodyMedium > div:not(:first-child)");
    rows.into_iter().map(clean_text).find_map(|row| {
        if row.starts_with("Open") || row.starts_with("Closed") {
            return None;
        }
        row.split('·')
            .map(str::trim)
            .rfind(|part| !part.is_empty() && Some(*part) != category)
            .map(str::to_string)
    })
}

fn absolute_link(href: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else {
        format!("{MAPS_ORIGIN}{href}")
    }
}

/// Whether `candidate` is a better identifier than `current`.
pub(crate) fn prefer_id(current: &str, candidate: &str) -> bool {
    IdKind::classify(candidate).preference() > IdKind::classify(current).preference()
}

pub(crate) fn clean_text(el: ElementRef) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn select_all<'a, N>(node: N, css: &str) -> Vec<ElementRef<'a>>
where
    N: Selectable<'a>,
{
    match Selector::parse(css) {
        Ok(selector) => node.select_with(&selector),
        Err(e) => {
            tracing::warn!("Invalid selector {}: {:?}", css, e);
            Vec::new()
        }
    }
}

pub(crate) fn select_first<'a, N>(node: N, css: &str) -> Option<ElementRef<'a>>
where
    N: Selectable<'a>,
{
    select_all(node, css).into_iter().next()
}

pub(crate) fn first_text<'a, N>(node: N, css: &str) -> Option<String>
where
    N: Selectable<'a>,
{
    select_first(node, css)
        .map(clean_text)
        .filter(|s| !s.is_empty())
}

/// Anything a selector can be run against.
pub(crate) trait Selectable<'a> {
    fn select_with(self, selector: &Selector) -> Vec<ElementRef<'a>>;
}

impl<'a> Selectable<'a> for &'a Html {
    fn select_with(self, selector: &Selector) -> Vec<ElementRef<'a>> {
        self.select(selector).collect()
    }
}

impl<'a> Selectable<'a> for ElementRef<'a> {
    fn select_with(self, selector: &Selector) -> Vec<ElementRef<'a>> {
        self.select(selector).collect()
    }
}
