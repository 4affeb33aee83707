//! Gateway routing driven with in-process HTTP requests.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use dcc_bridge::config::{BackendConfig, Config};
use dcc_bridge::gateway::{router, GatewayState};

use crate::common;

/// A gateway config with `modeler` pointed at the live test host and
/// `ghost` pointed at a dead port.
fn gateway_app(live: SocketAddr) -> Router {
    let mut config = Config::default();
    let mut backends = BTreeMap::new();
    backends.insert(
        "modeler".to_string(),
        BackendConfig {
            host: live.ip().to_string(),
            port: live.port(),
        },
    );
    backends.insert(
        "ghost".to_string(),
        BackendConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
        },
    );
    config.backends = backends;
    config.client.timeout = "500ms".to_string();
    config.client.retry_attempts = 1;
    config.client.retry_delay = "0s".to_string();

    let state = GatewayState::from_config(&config).expect("valid gateway config");
    router(state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).expect("JSON response body")
}

fn post_command(backend: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/api/v1/{}/command", backend))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_lists_backends_sorted() {
    let handle = common::start_host("modeler");
    let app = gateway_app(handle.local_addr());

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["backends"], serde_json::json!(["ghost", "modeler"]));

    handle.shutdown();
}

#[tokio::test]
async fn test_command_relays_to_live_backend() {
    let handle = common::start_host("modeler");
    let app = gateway_app(handle.local_addr());

    let response = app
        .oneshot(post_command("modeler", r#"{"method":"ping"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["result"]["status"], "pong");
    assert_eq!(body["id"], "1");

    handle.shutdown();
}

#[tokio::test]
async fn test_unknown_backend_is_404() {
    let handle = common::start_host("modeler");
    let app = gateway_app(handle.local_addr());

    let response = app
        .oneshot(post_command("sculptor", r#"{"method":"ping"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "UNKNOWN_BACKEND");
    assert_eq!(body["error"]["details"]["backend"], "sculptor");

    handle.shutdown();
}

#[tokio::test]
async fn test_dead_backend_maps_to_bad_gateway() {
    let handle = common::start_host("modeler");
    let app = gateway_app(handle.local_addr());

    let response = app
        .oneshot(post_command("ghost", r#"{"method":"ping"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "CONNECTION_ERROR");

    handle.shutdown();
}

#[tokio::test]
async fn test_method_not_found_maps_to_bad_request() {
    let handle = common::start_host("modeler");
    let app = gateway_app(handle.local_addr());

    let response = app
        .oneshot(post_command("modeler", r#"{"method":"missing_method"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "METHOD_NOT_FOUND");

    handle.shutdown();
}

#[tokio::test]
async fn test_backend_health_reports_disconnected() {
    let handle = common::start_host("modeler");
    let app = gateway_app(handle.local_addr());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health/ghost")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["backend"], "ghost");
    assert_eq!(body["status"], "disconnected");

    handle.shutdown();
}

#[tokio::test]
async fn test_backend_health_reports_connected() {
    let handle = common::start_host("modeler");
    let app = gateway_app(handle.local_addr());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health/modeler")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["status"], "connected");

    handle.shutdown();
}

#[tokio::test]
async fn test_version_aggregates_per_backend() {
    let handle = common::start_host("modeler");
    let app = gateway_app(handle.local_addr());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/version")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["gateway"]["name"], "dcc-bridge");

    // Live backend answers get_version; the dead one reports its failure
    // inside its own entry without failing the whole response.
    assert_eq!(body["backends"]["modeler"]["result"]["host"], "modeler");
    assert_eq!(
        body["backends"]["ghost"]["error"]["code"],
        "CONNECTION_ERROR"
    );

    handle.shutdown();
}
