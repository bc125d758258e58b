//! Type-Safe Configuration with Validation
//!
//! The helper reads a flat `key = value` file (HCL attributes with scalar
//! values, which is also valid TOML) and lets environment variables prefixed
//! with `JWT_AUTH_HELPER_` override individual keys.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Environment, File, FileFormat};
use serde::Deserialize;
use thiserror::Error;

use crate::mode::{Mode, ParseModeError};

/// Default configuration file name, looked up relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "envoy-jwt-auth-helper.conf";

/// Prefix of the environment variables that override file settings.
pub const ENV_PREFIX: &str = "JWT_AUTH_HELPER";

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file does not exist
    #[error("could not find config file {}: please use the --config flag", path.display())]
    NotFound { path: PathBuf },

    /// The configuration file could not be read or decoded
    #[error("unable to decode configuration {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: config::ConfigError,
    },

    /// `jwt_mode` is not a recognized mode
    #[error(transparent)]
    UnknownMode(#[from] ParseModeError),

    /// Invalid port number
    #[error("Invalid port: must be between 1 and 65535")]
    InvalidPort,

    /// Missing required field
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    /// A numeric setting is out of range
    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },

    /// The file decoded but its settings were rejected
    #[error("invalid configuration {}: {source}", path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: Box<ConfigError>,
    },
}

impl ConfigError {
    /// The underlying validation error, without the file context.
    #[must_use]
    pub fn root(&self) -> &ConfigError {
        match self {
            Self::Invalid { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Settings as they appear in the file, before validation.
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    socket_path: String,
    #[serde(default = "default_host")]
    host: String,
    #[serde(default)]
    port: u16,
    #[serde(default)]
    jwt_mode: String,
    #[serde(default)]
    audience: String,
    #[serde(default = "default_fetch_timeout")]
    fetch_timeout_secs: u64,
    #[serde(default = "default_startup_timeout")]
    startup_timeout_secs: u64,
    #[serde(default = "default_max_concurrent_streams")]
    max_concurrent_streams: u32,
    #[serde(default = "default_shutdown_timeout")]
    shutdown_timeout_secs: u64,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_json_logs")]
    json_logs: bool,
    #[serde(default = "default_otlp_endpoint")]
    otlp_endpoint: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_fetch_timeout() -> u64 {
    5
}

fn default_startup_timeout() -> u64 {
    30
}

fn default_max_concurrent_streams() -> u32 {
    10
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_json_logs() -> bool {
    true
}

fn default_otlp_endpoint() -> String {
    "http://localhost:4317".to_string()
}

/// Service configuration with validation.
#[derive(Debug, Clone)]
pub struct Config {
    /// Workload API address (`unix:///path`, a bare socket path, or `tcp://host:port`)
    pub socket_path: String,
    /// Listen host
    pub host: String,
    /// Listen port (1-65535)
    pub port: u16,
    /// Operating mode
    pub mode: Mode,
    /// Audience tokens are minted for or validated against
    pub audience: String,
    /// Upper bound for a single Workload API call or validation
    pub fetch_timeout: Duration,
    /// Budget for connecting to the Workload API and receiving the first bundles
    pub startup_timeout: Duration,
    /// Concurrent `Check` calls accepted per connection
    pub max_concurrent_streams: u32,
    /// Graceful shutdown budget
    pub shutdown_timeout: Duration,
    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,
    /// Emit JSON log lines
    pub json_logs: bool,
    /// OTLP collector endpoint (used with the `otel` feature)
    pub otlp_endpoint: String,
}

impl Config {
    /// Loads the configuration file at `path`, applies environment overrides
    /// and validates the result.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::load_with_env(path.as_ref(), Environment::with_prefix(ENV_PREFIX).try_parsing(true))
    }

    /// Loads the configuration file at `path` without environment overrides.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let (resolved, raw) = read_raw(path.as_ref(), None)?;
        Self::from_raw(raw).map_err(|source| invalid(resolved, source))
    }

    fn load_with_env(path: &Path, env: Environment) -> Result<Self, ConfigError> {
        let (resolved, raw) = read_raw(path, Some(env))?;
        Self::from_raw(raw).map_err(|source| invalid(resolved, source))
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        if raw.jwt_mode.is_empty() {
            return Err(ConfigError::MissingRequired("jwt_mode".to_string()));
        }
        let mode = raw.jwt_mode.parse::<Mode>()?;

        let config = Self {
            socket_path: raw.socket_path,
            host: raw.host,
            port: raw.port,
            mode,
            audience: raw.audience,
            fetch_timeout: Duration::from_secs(raw.fetch_timeout_secs),
            startup_timeout: Duration::from_secs(raw.startup_timeout_secs),
            max_concurrent_streams: raw.max_concurrent_streams,
            shutdown_timeout: Duration::from_secs(raw.shutdown_timeout_secs),
            log_level: raw.log_level,
            json_logs: raw.json_logs,
            otlp_endpoint: raw.otlp_endpoint,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.socket_path.is_empty() {
            return Err(ConfigError::MissingRequired("socket_path".to_string()));
        }
        if self.audience.is_empty() {
            return Err(ConfigError::MissingRequired("audience".to_string()));
        }
        if self.fetch_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "fetch_timeout_secs".to_string(),
                reason: "timeout must be greater than 0".to_string(),
            });
        }
        if self.startup_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "startup_timeout_secs".to_string(),
                reason: "timeout must be greater than 0".to_string(),
            });
        }
        if self.max_concurrent_streams == 0 {
            return Err(ConfigError::InvalidValue {
                name: "max_concurrent_streams".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    /// Listen address as `host:port`.
    #[must_use]
    pub fn listen_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

fn invalid(path: PathBuf, source: ConfigError) -> ConfigError {
    ConfigError::Invalid {
        path,
        source: Box::new(source),
    }
}

/// Reads the raw settings along with the absolute path they came from.
fn read_raw(path: &Path, env: Option<Environment>) -> Result<(PathBuf, RawConfig), ConfigError> {
    let resolved = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    if !resolved.is_file() {
        return Err(ConfigError::NotFound { path: resolved });
    }

    let mut builder = config::Config::builder()
        .add_source(File::from(resolved.as_path()).format(FileFormat::Toml).required(true));
    if let Some(env) = env {
        builder = builder.add_source(env);
    }

    match builder.build().and_then(|settings| settings.try_deserialize::<RawConfig>()) {
        Ok(raw) => Ok((resolved, raw)),
        Err(source) => Err(ConfigError::Decode {
            path: resolved,
            source,
        }),
    }
}
