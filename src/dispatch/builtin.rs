//! Built-in handlers every host exposes.
//!
//! `ping`, `get_version`, and `list_methods` are registered through
//! [`DispatcherBuilder::with_builtins`](super::DispatcherBuilder::with_builtins)
//! so even a host with no capability modules loaded answers liveness and
//! discovery probes.

use std::sync::Arc;

use serde_json::json;

use crate::error::CommandError;

use super::CommandRegistry;

/// Protocol version reported by `get_version`.
pub const API_VERSION: &str = "1.0.0";

pub(crate) fn register_builtins(registry: &Arc<CommandRegistry>, host_name: &str) {
    let name = host_name.to_string();
    registry.register(
        "ping",
        Arc::new(move |_params| {
            Ok(json!({
                "status": "pong",
                "message": format!("{} is running", name),
            }))
        }),
    );

    let name = host_name.to_string();
    registry.register(
        "get_version",
        Arc::new(move |_params| {
            Ok(json!({
                "host": name,
                "version": env!("CARGO_PKG_VERSION"),
                "api_version": API_VERSION,
            }))
        }),
    );

    // Weak reference: the handler lives inside the registry, so a strong
    // Arc here would form a cycle.
    let weak = Arc::downgrade(registry);
    registry.register(
        "list_methods",
        Arc::new(move |_params| {
            let registry = weak
                .upgrade()
                .ok_or_else(|| CommandError::Execution("registry dropped".to_string()))?;
            Ok(json!({ "methods": registry.list_methods() }))
        }),
    );
}
