use crate::error::Result;
use leadgrid_core::Coordinates;
use url::Url;

pub const MAPS_SEARCH_BASE: &str = "https://www.google.com/maps/search";

/// Map search URL for `keyword in location`, centred on `coordinates`.
///
/// `hl=en` forces the English UI so text-based selectors keep working
/// regardless of where the browser's traffic exits.
pub fn build_search_url(
    keyword: &str,
    location: &str,
    coordinates: Coordinates,
    zoom: u8,
) -> Result<String> {
    let query = if location.trim().is_empty() {
        keyword.trim().to_string()
    } else {
        format!("{} in {}", keyword.trim(), location.trim())
    };
    let viewport = format!(
        "@{},{},{}z",
        coordinates.latitude, coordinates.longitude, zoom
    );

    let mut url = Url::parse(MAPS_SEARCH_BASE)?;
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.push(&query).push(&viewport);
    }
    url.query_pairs_mut().append_pair("hl", "en");
    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_search_url() {
        let url = build_search_url(
            "coffee shops",
            "Austin, TX",
            Coordinates::new(30.2672, -97.7431),
            14,
        )
        .expect("valid url");
        assert_eq!(
            url,
            "https://www.google.com/maps/search/coffee%20shops%20in%20Austin,%20TX/@30.2672,-97.7431,14z?hl=en"
        );
    }

    #[test]
    fn test_slash_in_keyword_is_encoded() {
        let url = build_search_url("bars/pubs", "", Coordinates::new(1.5, 2.0), 12)
            .expect("valid url");
        assert!(url.contains("/search/bars%2Fpubs/@1.5,2,12z"));
    }
}
