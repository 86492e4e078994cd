//! Configuration loading
//!
//! Settings are resolved in priority order:
//! 1. Command-line argument
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default
//!
//! Tiers 1 and 2 are parsed by the server binary (clap with `env`) and arrive
//! here as [`ConfigOverrides`]. A missing TOML file is not an error; a file that
//! exists but does not parse is.
//!
//! The API key is compared byte for byte as given; surrounding whitespace is
//! part of the secret. A key that is empty or only whitespace means no key.

use crate::api::ApiKey;
use crate::{Error, Result};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 3001;

/// Default bind address
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";

/// Default debounce window for repeated detections of one person
pub const DEFAULT_DEBOUNCE_WINDOW_SECS: u64 = 60;

/// Default directory holding uploaded profile photos
pub const DEFAULT_UPLOADS_DIR: &str = "uploads";

fn default_log_level() -> String {
    "info".to_string()
}

/// Bootstrap configuration file contents
///
/// Every key is optional; anything not set falls through to the compiled
/// default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub bind_address: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    /// Path to SQLite database file
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Shared secret expected in `X-API-Key`
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base used to absolutize relative photo paths, e.g. `https://school.example`
    #[serde(default)]
    pub public_base_url: Option<String>,

    #[serde(default)]
    pub uploads_dir: Option<PathBuf>,

    /// Classroom used for lesson lookup when a detection names none
    #[serde(default)]
    pub default_classroom_code: Option<String>,

    #[serde(default)]
    pub debounce_window_secs: Option<u64>,

    /// Allowed browser origins; empty means permissive CORS
    #[serde(default)]
    pub cors_origins: Vec<String>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl TomlConfig {
    /// Parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid config file {}: {}", path.display(), e)))
    }

    /// Locate and parse the config file
    ///
    /// An explicitly requested path must exist. Otherwise the platform default
    /// location is tried, and its absence yields an empty config. Returns the
    /// path that was read, if any; this runs before logging is set up, so the
    /// caller reports it.
    pub fn discover(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }

        match default_config_path() {
            Some(path) if path.exists() => Ok((Self::load(&path)?, Some(path))),
            _ => Ok((Self::default(), None)),
        }
    }
}

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub database_path: Option<PathBuf>,
    pub api_key: Option<String>,
    pub public_base_url: Option<String>,
    pub uploads_dir: Option<PathBuf>,
    pub default_classroom_code: Option<String>,
    pub debounce_window_secs: Option<u64>,
    pub log_level: Option<String>,
}

/// Fully resolved server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: IpAddr,
    pub port: u16,
    pub database_path: PathBuf,
    /// `None` when no key is configured; ingestion then rejects every request
    pub api_key: Option<ApiKey>,
    pub public_base_url: Option<String>,
    pub uploads_dir: PathBuf,
    pub default_classroom_code: Option<String>,
    pub debounce_window: Duration,
    pub cors_origins: Vec<String>,
    pub log_level: String,
}

impl ServerConfig {
    /// Merge overrides over file values over defaults
    pub fn resolve(overrides: ConfigOverrides, file: TomlConfig) -> Result<Self> {
        let bind_raw = overrides
            .bind_address
            .or(file.bind_address)
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());
        let bind_address: IpAddr = bind_raw
            .parse()
            .map_err(|e| Error::Config(format!("Invalid bind address '{}': {}", bind_raw, e)))?;

        let debounce_secs = overrides
            .debounce_window_secs
            .or(file.debounce_window_secs)
            .unwrap_or(DEFAULT_DEBOUNCE_WINDOW_SECS);
        if debounce_secs == 0 {
            return Err(Error::Config(
                "debounce_window_secs must be greater than zero".to_string(),
            ));
        }

        // The secret is used verbatim; only an all-blank value counts as unset
        let api_key = overrides
            .api_key
            .or(file.api_key)
            .filter(|secret| !secret.trim().is_empty())
            .and_then(|secret| ApiKey::new(&secret));

        let public_base_url = non_empty(overrides.public_base_url.or(file.public_base_url))
            .map(|url| url.trim_end_matches('/').to_string());

        Ok(Self {
            bind_address,
            port: overrides.port.or(file.port).unwrap_or(DEFAULT_PORT),
            database_path: overrides
                .database_path
                .or(file.database_path)
                .unwrap_or_else(default_database_path),
            api_key,
            public_base_url,
            uploads_dir: overrides
                .uploads_dir
                .or(file.uploads_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOADS_DIR)),
            default_classroom_code: non_empty(
                overrides.default_classroom_code.or(file.default_classroom_code),
            ),
            debounce_window: Duration::from_secs(debounce_secs),
            cors_origins: file.cors_origins,
            log_level: overrides.log_level.unwrap_or(file.logging.level),
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Platform config file location, e.g. `~/.config/rollcall/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("rollcall").join("config.toml"))
}

/// Platform database location, e.g. `~/.local/share/rollcall/rollcall.db`
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("rollcall").join("rollcall.db"))
        .unwrap_or_else(|| PathBuf::from("./rollcall_data/rollcall.db"))
}
