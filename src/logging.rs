//! Logging initialization for the bridge.
//!
//! Configures the `tracing` subscriber with level filtering via the
//! `DCCB_LOG` environment variable, falling back to the configured
//! `[log] level`, then to `info`.
//!
//! # Usage
//!
//! ```bash
//! # Default (info level)
//! dccb gateway
//!
//! # Debug level
//! DCCB_LOG=debug dccb gateway
//!
//! # Module-specific filtering
//! DCCB_LOG=dcc_bridge=debug,warn dccb host
//! ```

use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable carrying filter directives.
pub const LOG_ENV_VAR: &str = "DCCB_LOG";

/// Initialize the tracing subscriber.
///
/// `fallback_level` comes from the config file; it is used when `DCCB_LOG`
/// is unset or invalid. Output goes to stderr, which works for both
/// foreground and daemonized modes.
///
/// # Panics
///
/// Panics if a global subscriber has already been set (call once, at
/// startup).
pub fn init(fallback_level: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_new(fallback_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
