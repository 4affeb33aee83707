//! Command dispatch: registry, builder, and the single-writer bridge.
//!
//! A [`CommandRegistry`] maps method names to capability handlers. A
//! [`Dispatcher`] routes incoming calls to handlers while preserving the one
//! invariant the whole bridge exists for: host state is only ever mutated
//! from the host's single engine context.
//!
//! Two execution modes exist:
//!
//! - [`ExecMode::Headless`] — the host has no event loop of its own, so the
//!   calling thread runs the handler inline.
//! - [`ExecMode::Engine`] — handlers must run on the engine thread. Calls
//!   from other threads are queued as [`engine::PendingCommand`]s and the
//!   caller blocks on a completion channel with a bounded timeout while the
//!   engine tick drains the queue.
//!
//! The registry is an owned value injected into the server; there is no
//! process-wide singleton. Registration happens through
//! [`DispatcherBuilder`] at startup.

pub mod builtin;
pub mod engine;

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::sync_channel;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::error::CommandError;
use crate::protocol::CommandParams;

pub use engine::{EngineLoop, EngineQueue};

/// A registered capability handler.
///
/// Handlers receive already-decoded named parameters and return a
/// JSON-serializable value or a typed error. They must be `Send + Sync`
/// because registration and dispatch happen on different threads, even
/// though an engine-bound handler only ever *runs* on the engine thread.
pub type Handler = Arc<dyn Fn(CommandParams) -> Result<Value, CommandError> + Send + Sync>;

/// Default bound on how long a cross-thread dispatch waits for the engine.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Thread-safe mapping from method names to handlers.
#[derive(Default)]
pub struct CommandRegistry {
    handlers: Mutex<HashMap<String, Handler>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Last registration wins; replacing an existing
    /// handler is logged at warn since it usually means two capability
    /// modules collided on a name.
    pub fn register(&self, method: impl Into<String>, handler: Handler) {
        let method = method.into();
        let mut handlers = self.handlers.lock().expect("registry lock poisoned");
        if handlers.insert(method.clone(), handler).is_some() {
            tracing::warn!(method = %method, "handler re-registered, previous handler replaced");
        } else {
            tracing::debug!(method = %method, "handler registered");
        }
    }

    /// Remove a handler. Returns false when the method was not registered;
    /// unregistering an unknown method is a no-op, not an error.
    pub fn unregister(&self, method: &str) -> bool {
        let mut handlers = self.handlers.lock().expect("registry lock poisoned");
        handlers.remove(method).is_some()
    }

    /// Look up a handler by name. The returned `Arc` clone lets the caller
    /// run the handler without holding the registry lock.
    pub fn lookup(&self, method: &str) -> Option<Handler> {
        let handlers = self.handlers.lock().expect("registry lock poisoned");
        handlers.get(method).cloned()
    }

    /// All registered method names, sorted.
    pub fn list_methods(&self) -> Vec<String> {
        let handlers = self.handlers.lock().expect("registry lock poisoned");
        let mut methods: Vec<String> = handlers.keys().cloned().collect();
        methods.sort();
        methods
    }
}

/// How a dispatcher executes handlers.
#[derive(Clone)]
pub enum ExecMode {
    /// No distinct engine context; run handlers inline on the caller.
    Headless,
    /// Handlers run on the engine thread; other threads bridge through the
    /// queue.
    Engine(Arc<EngineQueue>),
}

/// Routes method calls to registered handlers.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<CommandRegistry>,
    mode: ExecMode,
    wait_timeout: Duration,
}

impl Dispatcher {
    /// The underlying registry, for late register/unregister calls.
    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    /// Dispatch a method call.
    ///
    /// Unknown or empty methods fail with `METHOD_NOT_FOUND`. In engine mode
    /// a call from a non-engine thread blocks until the engine tick executes
    /// the handler, bounded by the configured wait timeout; expiry returns
    /// `TIMEOUT_ERROR` and marks the queued command cancelled so a later
    /// tick drops it instead of executing it.
    pub fn dispatch(&self, method: &str, params: CommandParams) -> Result<Value, CommandError> {
        let handler = self
            .registry
            .lookup(method)
            .filter(|_| !method.is_empty())
            .ok_or_else(|| CommandError::MethodNotFound {
                method: method.to_string(),
            })?;

        match &self.mode {
            ExecMode::Headless => run_handler(&handler, params),
            ExecMode::Engine(queue) if queue.is_engine_thread() => run_handler(&handler, params),
            ExecMode::Engine(queue) => {
                self.dispatch_via_engine(queue, method, handler, params)
            }
        }
    }

    fn dispatch_via_engine(
        &self,
        queue: &EngineQueue,
        method: &str,
        handler: Handler,
        params: CommandParams,
    ) -> Result<Value, CommandError> {
        let (completion, result_rx) = sync_channel(1);
        let cancelled = Arc::new(AtomicBool::new(false));
        queue.enqueue(engine::PendingCommand {
            method: method.to_string(),
            handler,
            params,
            completion,
            cancelled: Arc::clone(&cancelled),
            enqueued_at: Instant::now(),
        });

        match result_rx.recv_timeout(self.wait_timeout) {
            Ok(result) => result,
            Err(_) => {
                cancelled.store(true, std::sync::atomic::Ordering::SeqCst);
                tracing::warn!(
                    method = %method,
                    timeout = ?self.wait_timeout,
                    "engine did not execute command within the wait timeout"
                );
                Err(CommandError::Timeout(format!(
                    "engine did not respond to '{}' within {:?}",
                    method, self.wait_timeout
                )))
            }
        }
    }
}

/// Run a handler, converting panics into `EXECUTION_ERROR`.
///
/// A panicking capability must never take down a connection thread or the
/// engine tick.
pub(crate) fn run_handler(handler: &Handler, params: CommandParams) -> Result<Value, CommandError> {
    match catch_unwind(AssertUnwindSafe(|| handler(params))) {
        Ok(result) => result,
        Err(payload) => {
            let text = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            Err(CommandError::Execution(format!("handler panicked: {}", text)))
        }
    }
}

/// Builder assembling a registry and its execution mode at startup.
///
/// ```
/// use dcc_bridge::dispatch::DispatcherBuilder;
/// use serde_json::json;
///
/// let dispatcher = DispatcherBuilder::new()
///     .handler("echo", |params| Ok(json!(params)))
///     .build_headless();
/// assert!(dispatcher.dispatch("echo", Default::default()).is_ok());
/// ```
pub struct DispatcherBuilder {
    registry: Arc<CommandRegistry>,
    wait_timeout: Duration,
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(CommandRegistry::new()),
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }

    /// Register a capability handler.
    pub fn handler<F>(self, method: impl Into<String>, f: F) -> Self
    where
        F: Fn(CommandParams) -> Result<Value, CommandError> + Send + Sync + 'static,
    {
        self.registry.register(method, Arc::new(f));
        self
    }

    /// Register the built-in `ping` / `get_version` / `list_methods`
    /// handlers every host exposes.
    pub fn with_builtins(self, host_name: &str) -> Self {
        builtin::register_builtins(&self.registry, host_name);
        self
    }

    /// Bound on how long a cross-thread dispatch waits for the engine.
    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Build a dispatcher that runs handlers inline on the calling thread.
    pub fn build_headless(self) -> Dispatcher {
        Dispatcher {
            registry: self.registry,
            mode: ExecMode::Headless,
            wait_timeout: self.wait_timeout,
        }
    }

    /// Build a dispatcher bridging non-engine callers through `queue`.
    pub fn build_engine(self, queue: Arc<EngineQueue>) -> Dispatcher {
        Dispatcher {
            registry: self.registry,
            mode: ExecMode::Engine(queue),
            wait_timeout: self.wait_timeout,
        }
    }
}
