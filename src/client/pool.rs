//! Bounded cache of idle socket clients per backend.
//!
//! The pool amortizes TCP handshakes for bursty gateway traffic. It is a
//! reuse cache, not a semaphore: `acquire` never waits for capacity, it
//! just creates a fresh client when no idle one is usable. Each client
//! carries its own per-call mutex, so the pool itself needs no locking
//! beyond the idle list.

use std::sync::Arc;

use crate::client::{ClientConfig, SocketClient};

/// Default number of idle connections kept per backend.
pub const DEFAULT_POOL_SIZE: usize = 5;

/// Pool of idle [`SocketClient`]s for one backend endpoint.
pub struct ConnectionPool {
    config: ClientConfig,
    size: usize,
    idle: tokio::sync::Mutex<Vec<Arc<SocketClient>>>,
}

impl ConnectionPool {
    pub fn new(config: ClientConfig, size: usize) -> Self {
        Self {
            config,
            size,
            idle: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    /// The backend host this pool connects to.
    pub fn host(&self) -> &str {
        &self.config.host
    }

    /// The backend port this pool connects to.
    pub fn port(&self) -> u16 {
        self.config.port
    }

    /// The client settings used for new connections.
    pub fn client_config(&self) -> &ClientConfig {
        &self.config
    }

    /// Number of idle clients currently cached.
    pub async fn idle_count(&self) -> usize {
        self.idle.lock().await.len()
    }

    /// Take an idle, still-connected client or create a fresh one.
    ///
    /// Stale idle clients are dropped, not repaired. A connect failure on a
    /// fresh client is not an error here; `send_command` will retry and
    /// synthesize a `CONNECTION_ERROR` envelope if the backend stays down.
    pub async fn acquire(&self) -> Arc<SocketClient> {
        loop {
            let candidate = { self.idle.lock().await.pop() };
            match candidate {
                Some(client) if client.is_connected().await => {
                    tracing::debug!(
                        host = %self.config.host,
                        port = self.config.port,
                        "reusing pooled connection"
                    );
                    return client;
                }
                Some(_) => continue,
                None => break,
            }
        }

        let client = Arc::new(SocketClient::new(self.config.clone()));
        client.connect().await;
        client
    }

    /// Return a client to the pool.
    ///
    /// A disconnected client, or one arriving while the pool is at
    /// capacity, is closed and dropped rather than cached — the pool never
    /// grows past its configured size.
    pub async fn release(&self, client: Arc<SocketClient>) {
        if !client.is_connected().await {
            return;
        }
        let mut idle = self.idle.lock().await;
        if idle.len() < self.size {
            idle.push(client);
        } else {
            drop(idle);
            tracing::debug!(
                host = %self.config.host,
                port = self.config.port,
                "pool full, closing surplus connection"
            );
            client.disconnect().await;
        }
    }

    /// Disconnect and drop every idle client.
    pub async fn close(&self) {
        let clients: Vec<Arc<SocketClient>> = {
            let mut idle = self.idle.lock().await;
            idle.drain(..).collect()
        };
        for client in clients {
            client.disconnect().await;
        }
    }
}
