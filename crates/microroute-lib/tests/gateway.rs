mod common;

use std::time::Duration;

use common::{marina_dataset, marina_site, FAR_AWAY, ORIGIN};
use microroute_lib::gateway::{DirectionsProvider, GatewayFailure, GoogleDirections};
use microroute_lib::{
    Coordinate, ExternalRoute, Maneuver, Provenance, RouteRequest, RoutingConfig, RoutingService,
    TravelMode,
};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DIRECTIONS_PATH: &str = "/maps/api/directions/json";

fn config_for(server: &MockServer) -> RoutingConfig {
    RoutingConfig {
        directions_base_url: format!("{}{DIRECTIONS_PATH}", server.uri()),
        external_timeout: Duration::from_millis(500),
        ..RoutingConfig::default()
    }
    .with_api_key("test-key")
}

fn ok_body() -> serde_json::Value {
    json!({
        "status": "OK",
        "routes": [{
            "overview_polyline": {"points": "_p~iF~ps|U_ulLnnqC_mqNvxq`@"},
            "legs": [{
                "distance": {"value": 1234.0},
                "duration": {"value": 900.0},
                "steps": [
                    {"html_instructions": "Head <b>north</b> on <b>Marinaweg</b>",
                     "distance": {"value": 400.0}},
                    {"html_instructions": "Turn <b>left</b> onto <b>Zeedijk</b>",
                     "distance": {"value": 834.0},
                     "maneuver": "turn-left"}
                ]
            }]
        }]
    })
}

/// Call the blocking provider off the async runtime.
async fn directions(
    config: RoutingConfig,
    mode: TravelMode,
) -> Result<ExternalRoute, GatewayFailure> {
    tokio::task::spawn_blocking(move || {
        let provider = GoogleDirections::new(&config).expect("client builds");
        provider.directions(
            &Coordinate::new(51.5896, 3.7216),
            &Coordinate::new(51.6, 3.75),
            mode,
        )
    })
    .await
    .expect("blocking task completes")
}

#[tokio::test(flavor = "multi_thread")]
async fn normalizes_successful_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DIRECTIONS_PATH))
        .and(query_param("mode", "bicycling"))
        .and(query_param("language", "de"))
        .and(query_param("key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
        .expect(1)
        .mount(&server)
        .await;

    let route = directions(config_for(&server), TravelMode::Cycling)
        .await
        .expect("directions succeed");

    assert_eq!(route.geometry.len(), 3);
    assert_eq!(route.distance_m, 1234.0);
    assert_eq!(route.duration_s, 900.0);
    assert!((route.confidence - 0.9).abs() < 1e-9);
    assert_eq!(route.instructions.len(), 3);
    assert_eq!(route.instructions[0].text, "Head north on Marinaweg");
    assert_eq!(route.instructions[1].maneuver, Maneuver::TurnLeft);
    assert_eq!(route.instructions[2].maneuver, Maneuver::Arrive);
}

#[tokio::test(flavor = "multi_thread")]
async fn non_ok_status_is_an_api_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DIRECTIONS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "OVER_QUERY_LIMIT",
            "routes": []
        })))
        .mount(&server)
        .await;

    let failure = directions(config_for(&server), TravelMode::Walking)
        .await
        .expect_err("quota exceeded");
    assert_eq!(
        failure,
        GatewayFailure::ApiStatus {
            status: "OVER_QUERY_LIMIT".into(),
            message: "API returned status: OVER_QUERY_LIMIT".into(),
        }
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn http_errors_are_api_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let failure = directions(config_for(&server), TravelMode::Walking)
        .await
        .expect_err("service unavailable");
    assert!(matches!(
        failure,
        GatewayFailure::ApiStatus { ref status, .. } if status == "503"
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_provider_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(ok_body())
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let failure = directions(config_for(&server), TravelMode::Walking)
        .await
        .expect_err("timeout");
    assert_eq!(failure, GatewayFailure::Timeout);
}

#[tokio::test(flavor = "multi_thread")]
async fn garbage_body_is_a_decode_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
        .mount(&server)
        .await;

    let failure = directions(config_for(&server), TravelMode::Walking)
        .await
        .expect_err("not json");
    assert!(matches!(failure, GatewayFailure::Decode { .. }));
}

#[tokio::test(flavor = "multi_thread")]
async fn service_uses_google_when_local_network_cannot_help() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DIRECTIONS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let result = tokio::task::spawn_blocking(move || {
        let service = RoutingService::builder(config)
            .dataset(marina_site("marina.geojson"), marina_dataset())
            .build()
            .expect("service builds");
        let request = RouteRequest::new(ORIGIN, FAR_AWAY, TravelMode::Walking);
        let first = service.calculate_route(&request).expect("valid request");
        let second = service.calculate_route(&request).expect("valid request");
        (first, second)
    })
    .await
    .expect("blocking task completes");

    let (first, second) = result;
    assert_eq!(first.provenance, Provenance::External);
    assert_eq!(first.instructions[0].text, "Gehen Sie nach Norden auf Marinaweg");
    assert_eq!(first.instructions[1].text, "Links abbiegen auf Zeedijk");
    assert!(second.cached);
}
