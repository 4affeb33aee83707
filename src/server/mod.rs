//! Blocking TCP socket server embedded in each host.
//!
//! The server runs next to the host's own loop: one accept thread plus one
//! thread per live connection. Each connection reads newline-delimited
//! envelopes, routes requests through the injected [`Dispatcher`], and
//! writes one response envelope per request, in order. Every failure mode —
//! unparseable line, unknown method, handler error, handler panic — becomes
//! an `Error` envelope on the wire; nothing a client sends can take down a
//! connection thread, the accept loop, or the process.
//!
//! # Example
//!
//! ```no_run
//! use dcc_bridge::dispatch::DispatcherBuilder;
//! use dcc_bridge::server::{ServerConfig, SocketServer};
//!
//! let dispatcher = DispatcherBuilder::new().with_builtins("modeler").build_headless();
//! let server = SocketServer::bind(ServerConfig::default(), dispatcher)?;
//! let handle = server.start();
//! println!("listening on {}", handle.local_addr());
//! handle.shutdown();
//! # Ok::<(), std::io::Error>(())
//! ```

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::dispatch::Dispatcher;
use crate::error::CommandError;
use crate::protocol::Envelope;

/// How long the accept loop sleeps when no connection is pending.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(25);
/// Backoff after a transient accept error.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(150);

/// Socket server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to bind; 0 picks an ephemeral port (useful in tests).
    pub port: u16,
    /// Read timeout used as a liveness bound on idle connections.
    pub read_timeout: Duration,
    /// Largest accepted request line in bytes.
    pub max_line_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            read_timeout: Duration::from_secs(60),
            max_line_len: 1024 * 1024,
        }
    }
}

/// A bound but not yet running server.
pub struct SocketServer {
    listener: TcpListener,
    config: ServerConfig,
    dispatcher: Arc<Dispatcher>,
}

impl SocketServer {
    /// Bind the listening socket immediately so the caller learns the
    /// actual address before starting the accept loop.
    ///
    /// # Errors
    ///
    /// Returns the underlying `io::Error` when the address cannot be bound;
    /// the host decides whether that is fatal.
    pub fn bind(config: ServerConfig, dispatcher: Dispatcher) -> std::io::Result<Self> {
        let listener = TcpListener::bind((config.host.as_str(), config.port))?;
        tracing::info!(addr = %listener.local_addr()?, "socket server bound");
        Ok(Self {
            listener,
            config,
            dispatcher: Arc::new(dispatcher),
        })
    }

    /// The bound address.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Spawn the accept thread and return a handle for shutdown.
    pub fn start(self) -> ServerHandle {
        let local_addr = self
            .listener
            .local_addr()
            .expect("bound listener has a local address");
        let running = Arc::new(AtomicBool::new(true));
        let connections: Arc<Mutex<Vec<TcpStream>>> = Arc::new(Mutex::new(Vec::new()));

        let accept_running = Arc::clone(&running);
        let accept_connections = Arc::clone(&connections);
        let dispatcher = self.dispatcher;
        let config = self.config;
        let listener = self.listener;
        listener
            .set_nonblocking(true)
            .expect("listener supports nonblocking mode");

        let accept_thread = thread::Builder::new()
            .name("bridge-accept".to_string())
            .spawn(move || {
                accept_loop(listener, config, dispatcher, accept_running, accept_connections);
            })
            .expect("failed to spawn accept thread");

        ServerHandle {
            local_addr,
            running,
            connections,
            accept_thread: Some(accept_thread),
        }
    }
}

/// Handle to a running server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    connections: Arc<Mutex<Vec<TcpStream>>>,
    accept_thread: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// The address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, close every open connection, and join the accept
    /// thread. Connection threads end once their socket is shut down.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        tracing::info!(addr = %self.local_addr, "socket server shutting down");

        let mut connections = self.connections.lock().expect("connection list poisoned");
        for stream in connections.drain(..) {
            let _ = stream.shutdown(Shutdown::Both);
        }
        drop(connections);

        if let Some(handle) = self.accept_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(
    listener: TcpListener,
    config: ServerConfig,
    dispatcher: Arc<Dispatcher>,
    running: Arc<AtomicBool>,
    connections: Arc<Mutex<Vec<TcpStream>>>,
) {
    tracing::debug!("accept loop started");
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                tracing::debug!(%peer, "connection accepted");
                register_connection(&connections, &stream);
                let dispatcher = Arc::clone(&dispatcher);
                let running = Arc::clone(&running);
                let config = config.clone();
                let spawned = thread::Builder::new()
                    .name(format!("conn-{}", peer))
                    .spawn(move || {
                        handle_connection(stream, peer, config, dispatcher, running);
                    });
                if let Err(e) = spawned {
                    tracing::error!(%peer, error = %e, "failed to spawn connection thread");
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "accept error");
                    thread::sleep(ACCEPT_ERROR_BACKOFF);
                }
            }
        }
    }
    tracing::debug!("accept loop stopped");
}

/// Keep a clone of each live stream so shutdown can unblock its reader.
/// Dead entries are pruned opportunistically on every accept.
fn register_connection(connections: &Mutex<Vec<TcpStream>>, stream: &TcpStream) {
    if let Ok(clone) = stream.try_clone() {
        let mut list = connections.lock().expect("connection list poisoned");
        list.retain(|s| s.peer_addr().is_ok());
        list.push(clone);
    }
}

fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    config: ServerConfig,
    dispatcher: Arc<Dispatcher>,
    running: Arc<AtomicBool>,
) {
    if let Err(e) = stream.set_read_timeout(Some(config.read_timeout)) {
        tracing::error!(%peer, error = %e, "failed to set read timeout");
        return;
    }

    let mut buffer: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];

    while running.load(Ordering::SeqCst) {
        match stream.read(&mut chunk) {
            Ok(0) => {
                tracing::debug!(%peer, "client disconnected");
                break;
            }
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if !process_buffer(&mut stream, &peer, &mut buffer, &config, &dispatcher) {
                    break;
                }
            }
            // Read timeouts are liveness checks: keep looping while the
            // server is still marked running.
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                continue;
            }
            Err(e) => {
                tracing::debug!(%peer, error = %e, "connection read failed");
                break;
            }
        }
    }

    let _ = stream.shutdown(Shutdown::Both);
    tracing::debug!(%peer, "connection handler finished");
}

/// Answer every complete line in `buffer`. Returns false when the
/// connection should be dropped (write failure or oversized line).
fn process_buffer(
    stream: &mut TcpStream,
    peer: &SocketAddr,
    buffer: &mut Vec<u8>,
    config: &ServerConfig,
    dispatcher: &Dispatcher,
) -> bool {
    while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
        let raw: Vec<u8> = buffer.drain(..=pos).collect();
        let line = String::from_utf8_lossy(&raw[..raw.len() - 1]).into_owned();
        if line.trim().is_empty() {
            continue;
        }
        let response = process_line(dispatcher, &line);
        if !write_envelope(stream, peer, &response) {
            return false;
        }
    }

    // A partial line that already exceeds the limit can never complete.
    if buffer.len() > config.max_line_len {
        tracing::warn!(%peer, len = buffer.len(), "request line exceeds maximum length");
        let response = Envelope::error(
            CommandError::Parse(format!(
                "request line exceeds maximum length of {} bytes",
                config.max_line_len
            ))
            .to_body(),
            None,
        );
        let _ = write_envelope(stream, peer, &response);
        return false;
    }
    true
}

fn process_line(dispatcher: &Dispatcher, line: &str) -> Envelope {
    let envelope = match Envelope::parse(line) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::debug!(error = %e, "unparseable request line");
            return Envelope::error(
                CommandError::Parse(format!("Invalid JSON: {}", e)).to_body(),
                None,
            );
        }
    };

    match envelope {
        Envelope::Request { method, params, id } => {
            tracing::debug!(method = %method, id = ?id, "dispatching request");
            match dispatcher.dispatch(&method, params) {
                Ok(result) => Envelope::result(result, id),
                Err(err) => {
                    tracing::warn!(method = %method, code = err.code(), error = %err, "command failed");
                    Envelope::error(err.to_body(), id)
                }
            }
        }
        other => {
            let id = other.id().map(str::to_string);
            Envelope::error(
                CommandError::Parse("expected a request envelope".to_string()).to_body(),
                id,
            )
        }
    }
}

fn write_envelope(stream: &mut TcpStream, peer: &SocketAddr, envelope: &Envelope) -> bool {
    let line = match envelope.to_line() {
        Ok(line) => line,
        Err(e) => {
            // A handler produced a value serde_json cannot re-serialize;
            // answer with a generic execution error instead.
            tracing::error!(%peer, error = %e, "failed to serialize response");
            let fallback = Envelope::error(
                CommandError::Execution("response serialization failed".to_string()).to_body(),
                envelope.id().map(str::to_string),
            );
            match fallback.to_line() {
                Ok(line) => line,
                Err(_) => return false,
            }
        }
    };
    if let Err(e) = stream.write_all(line.as_bytes()) {
        tracing::debug!(%peer, error = %e, "write failed, dropping connection");
        return false;
    }
    true
}
