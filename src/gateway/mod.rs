//! Async HTTP/WebSocket gateway in front of the backend hosts.
//!
//! The gateway turns many concurrent caller requests into wire protocol
//! calls through pooled [`SocketClient`](crate::client::SocketClient)s. Its
//! event loop never blocks on socket I/O: every backend interaction is an
//! awaited pool call, so a slow backend stalls only the requests addressed
//! to it.
//!
//! Error codes, messages, and details reported by a backend are relayed to
//! callers verbatim; the gateway maps them to HTTP status classes without
//! reinterpreting them.

pub mod routes;
pub mod session;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::{get, post};
use axum::Router;

use crate::client::ConnectionPool;
use crate::config::{Config, ConfigError};

/// Shared gateway state: one connection pool per configured backend.
///
/// Cheap to clone; the pools are shared.
#[derive(Clone)]
pub struct GatewayState {
    backends: Arc<HashMap<String, Arc<ConnectionPool>>>,
    started_at: Instant,
}

impl GatewayState {
    /// Build pools for every backend in the config.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut backends = HashMap::new();
        for (name, backend) in &config.backends {
            let client_config = config.client_config(backend)?;
            backends.insert(
                name.clone(),
                Arc::new(ConnectionPool::new(client_config, config.client.pool_size)),
            );
        }
        Ok(Self {
            backends: Arc::new(backends),
            started_at: Instant::now(),
        })
    }

    /// The pool for a named backend.
    pub fn pool(&self, backend: &str) -> Option<Arc<ConnectionPool>> {
        self.backends.get(backend).cloned()
    }

    /// Configured backend names, sorted.
    pub fn backend_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    /// Time since the gateway started.
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Build the gateway router.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/api/v1/:backend/command", post(routes::command))
        .route("/health", get(routes::health))
        .route("/health/:backend", get(routes::backend_health))
        .route("/version", get(routes::version))
        .route("/ws/:backend", get(session::ws_handler))
        .with_state(state)
}
