//! dcc-bridge library
//!
//! This crate remote-controls single-threaded, stateful engine hosts (a 3D
//! content tool and a CAD kernel) from many concurrent clients. It provides
//! the control-plane protocol stack that makes this safe:
//!
//! - [`protocol`] — newline-delimited JSON envelopes (request / result /
//!   error) shared by every layer.
//! - [`dispatch`] — capability registry plus the single-writer bridge that
//!   serializes all host-state mutation onto the host's one engine context.
//! - [`server`] — blocking TCP socket server embedded next to the host's
//!   own loop; one accept thread, one thread per connection.
//! - [`client`] — async socket client with bounded retry, and a bounded
//!   connection pool per backend.
//! - [`gateway`] — async HTTP/WebSocket front end relaying caller requests
//!   to the backends through pooled clients.
//!
//! Three scheduling domains coexist: the gateway's cooperative event loop,
//! the server's OS threads, and the engine's single tick loop. The bridge's
//! core correctness property is that no capability handler ever observes
//! concurrent mutation of host state, no matter how many sockets are
//! issuing commands at once.
//!
//! # Platform Support
//!
//! Unix-like systems only (Linux, macOS): the gateway daemonizes via
//! `fork()` and shuts down on SIGTERM/SIGINT.

/// Wire protocol envelopes and line framing.
pub mod protocol;

/// Error taxonomy shared across dispatch, transport, and the gateway.
pub mod error;

/// Capability registry, dispatcher, and engine-context bridge.
pub mod dispatch;

/// Blocking TCP socket server embedded in each host.
pub mod server;

/// Async socket client and connection pool.
pub mod client;

/// Async HTTP/WebSocket gateway.
pub mod gateway;

/// Configuration schema, discovery, and validation.
pub mod config;

/// Tracing subscriber initialization.
pub mod logging;

pub use client::{ClientConfig, ConnectionPool, SocketClient};
pub use dispatch::{Dispatcher, DispatcherBuilder, EngineLoop, EngineQueue};
pub use error::{ClientError, CommandError};
pub use protocol::{CommandParams, Envelope, ErrorBody};
pub use server::{ServerConfig, ServerHandle, SocketServer};
