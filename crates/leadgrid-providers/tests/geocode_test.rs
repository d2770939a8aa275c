//! Integration tests for `NominatimGeocoder` using wiremock HTTP mocks.

use leadgrid_core::{Coordinates, GeocoderConfig};
use leadgrid_providers::{Geocoder, NominatimGeocoder, ProviderError};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn geocoder(server: &MockServer) -> NominatimGeocoder {
    let config = GeocoderConfig {
        base_url: format!("{}/search", server.uri()),
        reverse_url: format!("{}/reverse", server.uri()),
        user_agent: "LeadGridTest/1.0".to_string(),
        min_delay_ms: 0,
        timeout_secs: 5,
    };
    NominatimGeocoder::new(&config).expect("geocoder construction should not fail")
}

#[tokio::test]
async fn test_geocode_parses_string_coordinates() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "Austin, TX"))
        .and(query_param("format", "json"))
        .and(query_param("limit", "1"))
        .and(header("user-agent", "LeadGridTest/1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
            "lat": "30.2711286",
            "lon": "-97.7436995",
            "display_name": "Austin, Travis County, Texas, United States"
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let coordinates = geocoder(&server)
        .geocode("Austin, TX")
        .await
        .expect("geocode");
    assert!((coordinates.latitude - 30.271_128_6).abs() < 1e-9);
    assert!((coordinates.longitude + 97.743_699_5).abs() < 1e-9);
}

#[tokio::test]
async fn test_geocode_without_results_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;

    let err = geocoder(&server)
        .geocode("Nowhereville")
        .await
        .expect_err("empty result");
    match err {
        ProviderError::Geocode { query, reason } => {
            assert_eq!(query, "Nowhereville");
            assert_eq!(reason, "no results found");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_geocode_http_error_carries_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let err = geocoder(&server)
        .geocode("Austin, TX")
        .await
        .expect_err("rate limited");
    assert!(matches!(err, ProviderError::Api { status: 429, .. }));
}

#[tokio::test]
async fn test_reverse_returns_display_name() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/reverse"))
        .and(query_param("lat", "30.2672"))
        .and(query_param("lon", "-97.7431"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "display_name": "Congress Avenue, Austin, Texas"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let name = geocoder(&server)
        .reverse(Coordinates::new(30.2672, -97.7431))
        .await
        .expect("reverse");
    assert_eq!(name, "Congress Avenue, Austin, Texas");
}

#[tokio::test]
async fn test_reverse_error_payload_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/reverse"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"error": "Unable to geocode"})),
        )
        .mount(&server)
        .await;

    let err = geocoder(&server)
        .reverse(Coordinates::new(0.0, -160.0))
        .await
        .expect_err("ocean");
    assert!(matches!(err, ProviderError::Geocode { .. }));
}
