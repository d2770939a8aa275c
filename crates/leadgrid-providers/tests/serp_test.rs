//! Integration tests for `SerpClient` using wiremock HTTP mocks.

use leadgrid_core::{Coordinates, SerpConfig};
use leadgrid_providers::{MonthlyUsage, SerpClient, SerpQuery, UsageTracker};
use std::sync::Arc;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(server: &MockServer, limit: u32, max_pages: u32) -> (SerpClient, Arc<MonthlyUsage>) {
    let usage = Arc::new(MonthlyUsage::new());
    let config = SerpConfig {
        api_key: Some("test-key".to_string()),
        base_url: format!("{}/search.json", server.uri()),
        requests_per_second: 1000.0,
        monthly_limit: limit,
        max_pages,
        timeout_secs: 5,
    };
    let client = SerpClient::new(&config, usage.clone()).expect("client construction should not fail");
    (client, usage)
}

fn query(override_quota: bool) -> SerpQuery<'static> {
    SerpQuery {
        query: "coffee",
        coordinates: Coordinates::new(30.2672, -97.7431),
        zoom: 14,
        override_quota,
    }
}

fn result(id: &str, title: &str) -> serde_json::Value {
    serde_json::json!({
        "place_id": id,
        "title": title,
        "address": "Austin, TX",
        "gps_coordinates": {"latitude": 30.26, "longitude": -97.74}
    })
}

#[tokio::test]
async fn test_pagination_stops_without_next_marker() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search.json"))
        .and(query_param("start", "0"))
        .and(query_param("engine", "google_maps"))
        .and(query_param("ll", "@30.2672,-97.7431,14z"))
        .and(query_param("api_key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "local_results": [result("ChIJa", "A"), result("ChIJb", "B")],
            "serpapi_pagination": {"next": "https://serpapi.com/search.json?start=2"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/search.json"))
        .and(query_param("start", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "local_results": [result("ChIJc", "C")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (client, usage) = test_client(&server, 100, 5);
    let outcome = client.search(&query(false)).await;

    assert_eq!(outcome.calls, 2);
    assert_eq!(outcome.leads.len(), 3);
    assert!(!outcome.quota_exhausted);
    assert_eq!(usage.used(), 2);
    assert_eq!(outcome.leads[2].source_id, "ChIJc");
}

#[tokio::test]
async fn test_page_limit_bounds_pagination() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "local_results": [result("ChIJa", "A")],
            "serpapi_pagination": {"next": "more"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _usage) = test_client(&server, 100, 1);
    let outcome = client.search(&query(false)).await;
    assert_eq!(outcome.calls, 1);
    assert_eq!(outcome.leads.len(), 1);
}

#[tokio::test]
async fn test_quota_exhaustion_stops_mid_search() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "local_results": [result("ChIJa", "A")],
            "serpapi_pagination": {"next": "more"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (client, usage) = test_client(&server, 1, 5);
    let outcome = client.search(&query(false)).await;

    assert_eq!(outcome.calls, 1);
    assert_eq!(outcome.leads.len(), 1);
    assert!(outcome.quota_exhausted);
    assert_eq!(usage.used(), 1);
    assert!(client.quota_reached());
}

#[tokio::test]
async fn test_exhausted_quota_makes_no_calls_unless_overridden() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "local_results": [result("ChIJa", "A")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (client, usage) = test_client(&server, 100, 1);
    usage.increment(100);

    let blocked = client.search(&query(false)).await;
    assert_eq!(blocked.calls, 0);
    assert!(blocked.quota_exhausted);
    assert!(blocked.leads.is_empty());

    let forced = client.search(&query(true)).await;
    assert_eq!(forced.calls, 1);
    assert!(!forced.quota_exhausted);
    assert_eq!(forced.leads.len(), 1);
    assert_eq!(usage.used(), 101);
}

#[tokio::test]
async fn test_http_and_api_errors_end_pagination_quietly() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search.json"))
        .and(query_param("q", "broken"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/search.json"))
        .and(query_param("q", "coffee"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"error": "Invalid API key."})),
        )
        .mount(&server)
        .await;

    let (client, _usage) = test_client(&server, 100, 3);

    let mut broken = query(false);
    broken.query = "broken";
    let outcome = client.search(&broken).await;
    assert_eq!(outcome.calls, 1);
    assert!(outcome.leads.is_empty());
    assert!(!outcome.quota_exhausted);

    let outcome = client.search(&query(false)).await;
    assert_eq!(outcome.calls, 1);
    assert!(outcome.leads.is_empty());
}

#[tokio::test]
async fn test_missing_key_disables_client() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let config = SerpConfig {
        api_key: None,
        base_url: format!("{}/search.json", server.uri()),
        ..SerpConfig::default()
    };
    let client = SerpClient::new(&config, Arc::new(MonthlyUsage::new())).expect("client");
    assert!(!client.is_enabled());

    let outcome = client.search(&query(false)).await;
    assert_eq!(outcome.calls, 0);
    assert!(outcome.leads.is_empty());
}
