//! Configuration discovery and loading.
//!
//! Resolution order: explicit `--config` path, then the `DCCB_CONFIG`
//! environment variable, then the platform config directory
//! (`<config_dir>/dcc-bridge/config.toml`), then built-in defaults. An
//! explicitly named file that is missing or malformed is an error; a
//! missing default-location file silently falls back to defaults.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::error::ConfigError;
use crate::config::schema::Config;

/// Environment variable naming an alternate config file.
pub const CONFIG_ENV_VAR: &str = "DCCB_CONFIG";

/// The default configuration file location.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dcc-bridge")
        .join("config.toml")
}

/// Where the configuration was found.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// `--config PATH`.
    Flag(PathBuf),
    /// `DCCB_CONFIG` environment variable.
    Env(PathBuf),
    /// Platform default location.
    Default(PathBuf),
    /// No file found; built-in defaults.
    BuiltIn,
}

impl ConfigSource {
    /// The file path, when the config came from a file.
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigSource::Flag(p) | ConfigSource::Env(p) | ConfigSource::Default(p) => Some(p),
            ConfigSource::BuiltIn => None,
        }
    }
}

/// Discover, load, and validate configuration.
///
/// `explicit` is the `--config` flag value, if given. Explicit and
/// env-named files must exist; the default location may be absent.
pub fn load(explicit: Option<&Path>) -> Result<(Config, ConfigSource), ConfigError> {
    let (config, source) = if let Some(path) = explicit {
        (load_from_path(path)?, ConfigSource::Flag(path.to_path_buf()))
    } else if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
        let path = PathBuf::from(env_path);
        (load_from_path(&path)?, ConfigSource::Env(path))
    } else {
        let path = default_path();
        if path.exists() {
            (load_from_path(&path)?, ConfigSource::Default(path))
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            (Config::default(), ConfigSource::BuiltIn)
        }
    };
    config.validate()?;
    Ok((config, source))
}

/// Load configuration from a specific path.
pub fn load_from_path(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ConfigError::ReadError {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })?;
    parse_toml(&content, path)
}

/// Write the default configuration to `path` for `dccb config init`.
///
/// Parent directories are created as needed. Refuses to overwrite an
/// existing file unless `force` is set.
pub fn write_default(path: &Path, force: bool) -> Result<(), ConfigError> {
    if path.exists() && !force {
        return Err(ConfigError::AlreadyExists {
            path: path.to_path_buf(),
        });
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    let toml = toml::to_string_pretty(&Config::default()).map_err(|e| {
        ConfigError::InvalidValue {
            field: "config".to_string(),
            message: format!("default config failed to serialize: {}", e),
        }
    })?;
    fs::write(path, toml).map_err(|e| ConfigError::WriteError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Parse a TOML string into `Config` with position-aware error reporting.
fn parse_toml(content: &str, path: &Path) -> Result<Config, ConfigError> {
    toml::from_str(content).map_err(|e| {
        let (line, column) = e
            .span()
            .map(|span| {
                let line = content[..span.start].matches('\n').count() + 1;
                let last_newline = content[..span.start]
                    .rfind('\n')
                    .map(|p| p + 1)
                    .unwrap_or(0);
                let column = span.start - last_newline + 1;
                (line, column)
            })
            .unwrap_or((0, 0));
        ConfigError::ParseError {
            path: path.to_path_buf(),
            line,
            column,
            message: e.message().to_string(),
        }
    })
}
