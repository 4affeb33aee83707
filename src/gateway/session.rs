//! Long-lived WebSocket sessions for interactive command streams.
//!
//! `GET /ws/{backend}` upgrades to a session holding one pooled client for
//! its whole lifetime. Caller frames are relayed to `send_command` one at a
//! time, in order, so the one-outstanding-call invariant holds for the
//! session's connection. Backend errors travel inside `command_result`
//! frames; only a closed WebSocket ends the session.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Map, Value};

use crate::client::{ConnectionPool, SocketClient};
use crate::protocol::CommandParams;

use super::GatewayState;

/// `GET /ws/{backend}` — upgrade to a command session.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
    Path(backend): Path<String>,
) -> Response {
    let Some(pool) = state.pool(&backend) else {
        return (
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
            .into_response();
    };
    ws.on_upgrade(move |socket| run_session(socket, backend, pool))
}

async fn run_session(mut socket: WebSocket, backend: String, pool: Arc<ConnectionPool>) {
    tracing::debug!(backend = %backend, "websocket session opened");
    let client = pool.acquire().await;

    let hello = json!({"type": "connected", "backend": backend}).to_string();
    if socket.send(Message::Text(hello)).await.is_err() {
        pool.release(client).await;
        return;
    }

    while let Some(frame) = socket.recv().await {
        let message = match frame {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(backend = %backend, error = %e, "websocket receive failed");
                break;
            }
        };
        match message {
            Message::Text(text) => {
                let reply = handle_frame(&client, &text).await;
                if socket.send(Message::Text(reply.to_string())).await.is_err() {
                    break;
                }
            }
            Message::Close(_) => break,
            // Ping/pong is handled by the protocol layer; binary frames are
            // not part of the session protocol.
            _ => {}
        }
    }

    pool.release(client).await;
    tracing::debug!(backend = %backend, "websocket session closed");
}

/// Answer one session frame. Invalid frames produce an error frame; the
/// session itself stays open.
async fn handle_frame(client: &SocketClient, text: &str) -> Value {
    let frame: Value = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            return error_frame("PARSE_ERROR", &format!("Invalid JSON: {}", e), json!({}));
        }
    };

    match frame.get("type").and_then(Value::as_str) {
        Some("ping") => json!({"type": "pong"}),
        Some("command") => {
            let Some(method) = frame.get("method").and_then(Value::as_str) else {
                return error_frame(
                    "VALIDATION_ERROR",
                    "command frame requires a 'method' field",
                    json!({}),
                );
            };
            let params: CommandParams = match frame.get("params") {
                None | Some(Value::Null) => Map::new(),
                Some(Value::Object(map)) => map.clone(),
                Some(_) => {
                    return error_frame(
                        "VALIDATION_ERROR",
                        "command 'params' must be an object",
                        json!({}),
                    );
                }
            };
            let envelope = client.send_command(method, params).await;
            json!({
                "type": "command_result",
                "method": method,
                "result": envelope.to_value(),
            })
        }
        Some(other) => error_frame(
            "VALIDATION_ERROR",
            &format!("Unknown message type: {}", other),
            json!({"type": other}),
        ),
        None => error_frame(
            "VALIDATION_ERROR",
            "frame requires a 'type' field",
            json!({}),
        ),
    }
}

fn error_frame(code: &str, message: &str, details: Value) -> Value {
    json!({
        "type": "error",
        "error": {
            "code": code,
            "message": message,
            "details": details,
        },
    })
}
