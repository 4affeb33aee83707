//! Configuration: TOML schema, discovery, and validation.

/// Configuration error types.
pub mod error;

/// Configuration discovery and file loading.
pub mod loader;

/// TOML configuration schema types.
pub mod schema;

pub use error::ConfigError;
pub use loader::{load, ConfigSource};
pub use schema::{BackendConfig, Config};
