// Configuration loading and parsing (config.toml + environment credentials).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable holding the Tencent Cloud secret id.
pub const SECRET_ID_ENV: &str = "TENCENT_SECRET_ID";
/// Environment variable holding the Tencent Cloud secret key.
pub const SECRET_KEY_ENV: &str = "TENCENT_SECRET_KEY";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {message}")]
    ReadError { path: PathBuf, message: String },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },
}

// ---------------------------------------------------------------------------
// Config sections
// ---------------------------------------------------------------------------

/// The assembled application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub watcher: WatcherConfig,
    pub solver: SolverConfig,
    pub credentials: Credentials,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address for the viewer WebSocket server.
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Clipboard poll interval in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        WatcherConfig {
            poll_interval_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Vision model identifier sent to the provider.
    pub model: String,
    /// Upper bound on answer length requested from the provider.
    pub max_tokens: u32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            model: "hunyuan-turbos-vision-20250619".to_string(),
            max_tokens: 1024,
        }
    }
}

/// API credentials, sourced from the environment rather than config.toml so
/// they never end up in a checked-in file.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub secret_id: Option<String>,
    pub secret_key: Option<String>,
}

impl Credentials {
    pub fn from_values(secret_id: Option<String>, secret_key: Option<String>) -> Self {
        Credentials {
            secret_id,
            secret_key,
        }
    }

    /// Read `TENCENT_SECRET_ID` / `TENCENT_SECRET_KEY` from the process
    /// environment. Absent variables become `None`.
    pub fn from_env() -> Self {
        Self::from_values(
            std::env::var(SECRET_ID_ENV).ok(),
            std::env::var(SECRET_KEY_ENV).ok(),
        )
    }

    /// True when both secrets are present and neither is empty or one of the
    /// `YOUR_SECRET_ID` / `YOUR_SECRET_KEY` placeholders from the setup docs.
    pub fn configured(&self) -> bool {
        fn usable(value: &Option<String>) -> bool {
            matches!(value.as_deref(), Some(s) if !s.trim().is_empty() && !s.starts_with("YOUR_"))
        }
        usable(&self.secret_id) && usable(&self.secret_key)
    }
}

// ---------------------------------------------------------------------------
// config.toml file shape
// ---------------------------------------------------------------------------

/// Raw deserialization target for config.toml. Every section is optional;
/// missing sections fall back to defaults.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    watcher: WatcherConfig,
    #[serde(default)]
    solver: SolverConfig,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load configuration from `config.toml` under `base_dir`. A missing file is
/// not an error: the defaults describe a fully working local setup.
/// Credentials are left unset; callers fill them from the environment.
pub(crate) fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config.toml");

    let file: ConfigFile = if path.exists() {
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadError {
            path: path.clone(),
            message: e.to_string(),
        })?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseError {
            path: path.clone(),
            source: e,
        })?
    } else {
        ConfigFile::default()
    };

    let config = Config {
        server: file.server,
        watcher: file.watcher,
        solver: file.solver,
        credentials: Credentials::default(),
    };

    validate(&config)?;

    Ok(config)
}

/// Convenience wrapper: loads `config.toml` relative to the current working
/// directory and credentials from the environment.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|e| ConfigError::ReadError {
        path: PathBuf::from("."),
        message: e.to_string(),
    })?;
    let mut config = load_config_from(&cwd)?;
    config.credentials = Credentials::from_env();
    Ok(config)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError {
            field: "server.port".into(),
            message: "must be a concrete listen port, not 0".into(),
        });
    }

    if config.watcher.poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError {
            field: "watcher.poll_interval_ms".into(),
            message: "must be greater than 0".into(),
        });
    }

    if config.solver.model.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "solver.model".into(),
            message: "must not be empty".into(),
        });
    }

    if config.solver.max_tokens == 0 {
        return Err(ConfigError::ValidationError {
            field: "solver.max_tokens".into(),
            message: "must be greater than 0".into(),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
