//! HTTP endpoints: command relay, health probes, version aggregation.

use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::client::SocketClient;
use crate::error::codes;
use crate::protocol::{CommandParams, Envelope};

use super::GatewayState;

/// Bound on backend health probes, independent of the call timeout.
const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Body of `POST /api/v1/{backend}/command`.
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub method: String,
    #[serde(default)]
    pub params: CommandParams,
}

/// `POST /api/v1/{backend}/command` — relay one command to a backend.
///
/// Exactly one `send_command` per inbound call. The response body is the
/// backend's envelope re-serialized unchanged; only the HTTP status is
/// derived from the error code.
pub async fn command(
    State(state): State<GatewayState>,
    Path(backend): Path<String>,
    Json(request): Json<CommandRequest>,
) -> Response {
    let Some(pool) = state.pool(&backend) else {
        return unknown_backend(&backend);
    };

    tracing::debug!(backend = %backend, method = %request.method, "relaying command");
    let client = pool.acquire().await;
    let envelope = client.send_command(&request.method, request.params).await;
    pool.release(client).await;

    envelope_response(envelope)
}

/// `GET /health` — gateway liveness.
pub async fn health(State(state): State<GatewayState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "uptime_secs": state.uptime().as_secs(),
        "backends": state.backend_names(),
    }))
}

/// `GET /health/{backend}` — ping one backend with a short-lived client.
///
/// Uses a 5 s single-attempt probe regardless of the configured call
/// timeout so a hung backend cannot stall the health endpoint for long.
pub async fn backend_health(
    State(state): State<GatewayState>,
    Path(backend): Path<String>,
) -> Response {
    let Some(pool) = state.pool(&backend) else {
        return unknown_backend(&backend);
    };

    let mut probe_config = pool.client_config().clone();
    probe_config.timeout = HEALTH_PROBE_TIMEOUT;
    probe_config.retry_attempts = 1;
    probe_config.retry_delay = Duration::from_millis(0);

    let probe = SocketClient::new(probe_config);
    let reply = probe.send_command("ping", Map::new()).await;
    probe.disconnect().await;

    let status = if reply.is_success() {
        "connected"
    } else {
        "disconnected"
    };
    Json(json!({
        "backend": backend,
        "status": status,
        "host": pool.host(),
        "port": pool.port(),
    }))
    .into_response()
}

/// `GET /version` — gateway version plus per-backend `get_version`.
///
/// A backend failure is reported inside that backend's entry; it never
/// fails the whole response.
pub async fn version(State(state): State<GatewayState>) -> Json<Value> {
    let mut backends = Map::new();
    for name in state.backend_names() {
        let Some(pool) = state.pool(&name) else {
            continue;
        };
        let client = pool.acquire().await;
        let envelope = client.send_command("get_version", Map::new()).await;
        pool.release(client).await;
        backends.insert(name, envelope.to_value());
    }

    Json(json!({
        "gateway": {
            "name": "dcc-bridge",
            "version": env!("CARGO_PKG_VERSION"),
        },
        "backends": backends,
    }))
}

/// Map a backend envelope to an HTTP response, preserving the body.
fn envelope_response(envelope: Envelope) -> Response {
    match &envelope {
        Envelope::Result { .. } => (StatusCode::OK, Json(envelope.to_value())).into_response(),
        Envelope::Error { error, .. } => {
            let status = status_for_code(&error.code);
            (status, Json(envelope.to_value())).into_response()
        }
        // A backend answering with a request envelope is a protocol
        // violation; treat it like an unintelligible response.
        Envelope::Request { .. } => (
            StatusCode::BAD_GATEWAY,
            Json(json!({
                "status": "error",
                "error": {
                    "code": codes::PARSE_ERROR,
                    "message": "backend returned a request envelope",
                    "details": {},
                },
            })),
        )
            .into_response(),
    }
}

fn status_for_code(code: &str) -> StatusCode {
    match code {
        codes::CONNECTION_ERROR | codes::TIMEOUT_ERROR => StatusCode::BAD_GATEWAY,
        codes::PARSE_ERROR | codes::METHOD_NOT_FOUND | "VALIDATION_ERROR" => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn unknown_backend(backend: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "status": "error",
            "error": {
                "code": "UNKNOWN_BACKEND",
                "message": format!("Unknown backend: {}", backend),
                "details": { "backend": backend },
            },
        })),
    )
        .into_response()
}
