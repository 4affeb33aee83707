//! TOML configuration schema for the bridge.
//!
//! All structs derive `Deserialize` and `Serialize` with defaults via
//! `#[serde(default)]`, so a partial config file is always valid. Duration
//! fields use human-readable strings (e.g. `"30s"`, `"10ms"`) parsed by the
//! `humantime` crate; [`Config::validate`] rejects unparseable values up
//! front so runtime code never sees them.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::ClientConfig;
use crate::config::error::ConfigError;
use crate::server::ServerConfig;

/// Root configuration encompassing all sections.
///
/// ```toml
/// [gateway]
/// [backends.modeler]
/// [backends.cad]
/// [client]
/// [host]
/// [log]
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// HTTP/WebSocket gateway settings.
    pub gateway: GatewaySection,
    /// Backend hosts keyed by name (e.g. `modeler`, `cad`).
    pub backends: BTreeMap<String, BackendConfig>,
    /// Socket client settings shared by all backends.
    pub client: ClientSection,
    /// Embedded host settings (socket server + engine loop).
    pub host: HostSection,
    /// Logging settings.
    pub log: LogSection,
}

impl Default for Config {
    fn default() -> Self {
        let mut backends = BTreeMap::new();
        backends.insert(
            "modeler".to_string(),
            BackendConfig {
                host: "127.0.0.1".to_string(),
                port: 9876,
            },
        );
        backends.insert(
            "cad".to_string(),
            BackendConfig {
                host: "127.0.0.1".to_string(),
                port: 9877,
            },
        );
        Self {
            gateway: GatewaySection::default(),
            backends,
            client: ClientSection::default(),
            host: HostSection::default(),
            log: LogSection::default(),
        }
    }
}

/// Gateway listen address.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct GatewaySection {
    pub host: String,
    pub port: u16,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// One backend host endpoint.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    pub host: String,
    pub port: u16,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9876,
        }
    }
}

/// Socket client behavior.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ClientSection {
    /// Per-call connect/read timeout (humantime string).
    pub timeout: String,
    /// Connection attempts per call, including the first.
    pub retry_attempts: u32,
    /// Pause between attempts (humantime string).
    pub retry_delay: String,
    /// Idle connections cached per backend.
    pub pool_size: usize,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            timeout: "30s".to_string(),
            retry_attempts: 3,
            retry_delay: "1s".to_string(),
            pool_size: 5,
        }
    }
}

/// Embedded host behavior.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HostSection {
    /// Connection liveness bound (humantime string).
    pub read_timeout: String,
    /// Engine queue drain interval (humantime string).
    pub tick_interval: String,
    /// Bound on cross-thread dispatch waits (humantime string).
    pub wait_timeout: String,
}

impl Default for HostSection {
    fn default() -> Self {
        Self {
            read_timeout: "60s".to_string(),
            tick_interval: "10ms".to_string(),
            wait_timeout: "30s".to_string(),
        }
    }
}

/// Logging defaults; overridable with the `DCCB_LOG` env var.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LogSection {
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Check that the config is internally usable: ports are non-zero, at
    /// least one backend exists, the pool has capacity, and every duration
    /// string parses to a non-zero duration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backends.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "backends".to_string(),
                message: "at least one backend must be configured".to_string(),
            });
        }
        for (name, backend) in &self.backends {
            if backend.port == 0 {
                return Err(ConfigError::InvalidValue {
                    field: format!("backends.{}.port", name),
                    message: "port must be non-zero".to_string(),
                });
            }
        }
        if self.gateway.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "gateway.port".to_string(),
                message: "port must be non-zero".to_string(),
            });
        }
        if self.client.pool_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "client.pool_size".to_string(),
                message: "pool size must be at least 1".to_string(),
            });
        }
        if self.client.retry_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "client.retry_attempts".to_string(),
                message: "at least one attempt is required".to_string(),
            });
        }
        parse_nonzero_duration("client.timeout", &self.client.timeout)?;
        parse_duration("client.retry_delay", &self.client.retry_delay)?;
        parse_nonzero_duration("host.read_timeout", &self.host.read_timeout)?;
        parse_nonzero_duration("host.tick_interval", &self.host.tick_interval)?;
        parse_nonzero_duration("host.wait_timeout", &self.host.wait_timeout)?;
        Ok(())
    }

    /// Client settings for one backend endpoint.
    pub fn client_config(&self, backend: &BackendConfig) -> Result<ClientConfig, ConfigError> {
        Ok(ClientConfig {
            host: backend.host.clone(),
            port: backend.port,
            timeout: parse_duration("client.timeout", &self.client.timeout)?,
            retry_attempts: self.client.retry_attempts,
            retry_delay: parse_duration("client.retry_delay", &self.client.retry_delay)?,
        })
    }

    /// Socket server settings for an embedded host.
    pub fn server_config(&self, host: &str, port: u16) -> Result<ServerConfig, ConfigError> {
        Ok(ServerConfig {
            host: host.to_string(),
            port,
            read_timeout: parse_duration("host.read_timeout", &self.host.read_timeout)?,
            ..ServerConfig::default()
        })
    }

    /// Engine queue drain interval.
    pub fn tick_interval(&self) -> Result<Duration, ConfigError> {
        parse_duration("host.tick_interval", &self.host.tick_interval)
    }

    /// Bound on cross-thread dispatch waits.
    pub fn wait_timeout(&self) -> Result<Duration, ConfigError> {
        parse_duration("host.wait_timeout", &self.host.wait_timeout)
    }
}

fn parse_duration(field: &str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value).map_err(|e| ConfigError::InvalidValue {
        field: field.to_string(),
        message: format!("'{}' is not a valid duration: {}", value, e),
    })
}

fn parse_nonzero_duration(field: &str, value: &str) -> Result<Duration, ConfigError> {
    let duration = parse_duration(field, value)?;
    if duration.is_zero() {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            message: "duration must be greater than zero".to_string(),
        });
    }
    Ok(duration)
}
