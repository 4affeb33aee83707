//! Async socket client for talking to a host's socket server.
//!
//! The client owns at most one TCP connection and enforces the
//! one-outstanding-call-at-a-time invariant with an internal async mutex:
//! two tasks calling [`SocketClient::send_command`] concurrently are
//! serialized, so request and response lines can never interleave on the
//! wire.
//!
//! `send_command` never returns `Err`. Transport failures are retried up to
//! `retry_attempts` times and, once exhausted, folded into a synthetic
//! `CONNECTION_ERROR` envelope; an unintelligible response becomes a
//! synthetic `PARSE_ERROR` envelope without retry. Callers always get an
//! [`Envelope`] and decide themselves how to surface backend-reported
//! failures.

pub mod pool;

pub use pool::ConnectionPool;

use std::time::Duration;

use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

use crate::error::{codes, ClientError};
use crate::protocol::{CommandParams, Envelope, ErrorBody};

/// Client connection settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// Bound on connect and on each response read.
    pub timeout: Duration,
    /// Total connection attempts per call, including the first.
    pub retry_attempts: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9876,
            timeout: Duration::from_secs(30),
            retry_attempts: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

struct ClientInner {
    conn: Option<Connection>,
    next_request_id: u64,
}

/// One logical connection to a backend host.
pub struct SocketClient {
    config: ClientConfig,
    inner: tokio::sync::Mutex<ClientInner>,
}

impl SocketClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            inner: tokio::sync::Mutex::new(ClientInner {
                conn: None,
                next_request_id: 0,
            }),
        }
    }

    /// The configured backend host.
    pub fn host(&self) -> &str {
        &self.config.host
    }

    /// The configured backend port.
    pub fn port(&self) -> u16 {
        self.config.port
    }

    /// Establish the connection if not already connected.
    ///
    /// Non-throwing by contract: returns true iff a connection is now
    /// established. The attempt is bounded by the configured timeout.
    pub async fn connect(&self) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.conn.is_some() {
            return true;
        }
        match open_connection(&self.config).await {
            Ok(conn) => {
                inner.conn = Some(conn);
                true
            }
            Err(e) => {
                tracing::debug!(
                    host = %self.config.host,
                    port = self.config.port,
                    error = %e,
                    "connect failed"
                );
                false
            }
        }
    }

    /// Drop the connection. Idempotent.
    pub async fn disconnect(&self) {
        let mut inner = self.inner.lock().await;
        inner.conn = None;
    }

    /// True when a connection is currently held.
    pub async fn is_connected(&self) -> bool {
        self.inner.lock().await.conn.is_some()
    }

    /// Send one command and await its response envelope.
    ///
    /// Serialized against concurrent callers on the same client. Returns a
    /// `Result` or `Error` envelope from the backend, or a synthetic
    /// `CONNECTION_ERROR` / `PARSE_ERROR` envelope on transport failure —
    /// never an `Err`.
    pub async fn send_command(&self, method: &str, params: CommandParams) -> Envelope {
        let mut inner = self.inner.lock().await;

        inner.next_request_id += 1;
        let id = inner.next_request_id.to_string();
        let request = Envelope::request(method, params, Some(id.clone()));
        let line = match request.to_line() {
            Ok(line) => line,
            Err(e) => {
                return Envelope::error(
                    ErrorBody::new(
                        codes::PARSE_ERROR,
                        format!("failed to serialize request: {}", e),
                    ),
                    Some(id),
                )
            }
        };

        for attempt in 1..=self.config.retry_attempts {
            match self.round_trip(&mut inner, &line).await {
                Ok(reply) => {
                    return match Envelope::parse(&reply) {
                        Ok(envelope) => envelope,
                        // The backend is alive but unintelligible; retrying
                        // will not help.
                        Err(e) => Envelope::error(
                            ErrorBody::new(
                                codes::PARSE_ERROR,
                                format!("Invalid JSON response: {}", e),
                            ),
                            Some(id),
                        ),
                    };
                }
                Err(e) => {
                    tracing::warn!(
                        method = %method,
                        attempt,
                        max_attempts = self.config.retry_attempts,
                        error = %e,
                        "transport failure"
                    );
                    inner.conn = None;
                    if attempt < self.config.retry_attempts {
                        sleep(self.config.retry_delay).await;
                    }
                }
            }
        }

        Envelope::error(
            ErrorBody::new(
                codes::CONNECTION_ERROR,
                format!(
                    "cannot reach {}:{} after {} attempts",
                    self.config.host, self.config.port, self.config.retry_attempts
                ),
            )
            .with_details(json!({
                "host": self.config.host,
                "port": self.config.port,
                "attempts": self.config.retry_attempts,
            })),
            Some(id),
        )
    }

    /// One write/read round trip on the held connection, connecting first
    /// if needed.
    async fn round_trip(
        &self,
        inner: &mut ClientInner,
        line: &str,
    ) -> Result<String, ClientError> {
        if inner.conn.is_none() {
            inner.conn = Some(open_connection(&self.config).await?);
        }
        let conn = inner.conn.as_mut().ok_or(ClientError::NotConnected)?;

        conn.writer.write_all(line.as_bytes()).await?;
        conn.writer.flush().await?;

        let mut reply = String::new();
        let read = timeout(self.config.timeout, conn.reader.read_line(&mut reply))
            .await
            .map_err(|_| ClientError::ReadTimeout)??;
        if read == 0 {
            return Err(ClientError::ConnectionClosed);
        }
        Ok(reply)
    }
}

async fn open_connection(config: &ClientConfig) -> Result<Connection, ClientError> {
    let stream = timeout(
        config.timeout,
        TcpStream::connect((config.host.as_str(), config.port)),
    )
    .await
    .map_err(|_| ClientError::ReadTimeout)??;
    let (read_half, write_half) = stream.into_split();
    Ok(Connection {
        reader: BufReader::new(read_half),
        writer: write_half,
    })
}
