//! Command-line arguments
//!
//! Every flag can also be given through its environment variable. Values
//! left unset fall through to the TOML config file and then to defaults.

use clap::Parser;
use rollcall_common::config::ConfigOverrides;
use std::path::PathBuf;

/// Command-line arguments for rollcall-server
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "rollcall-server")]
#[command(about = "Attendance ingestion and live presence service")]
#[command(version)]
pub struct Args {
    /// Path to TOML config file
    #[arg(short, long, env = "ROLLCALL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "ROLLCALL_BIND_ADDRESS")]
    pub bind_address: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "ROLLCALL_PORT")]
    pub port: Option<u16>,

    /// SQLite database file
    #[arg(short, long, env = "ROLLCALL_DATABASE")]
    pub database: Option<PathBuf>,

    /// Shared secret expected in the X-API-Key header
    #[arg(long, env = "ROLLCALL_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Public base URL used for photo links
    #[arg(long, env = "ROLLCALL_PUBLIC_BASE_URL")]
    pub public_base_url: Option<String>,

    /// Directory served under /uploads
    #[arg(long, env = "ROLLCALL_UPLOADS_DIR")]
    pub uploads_dir: Option<PathBuf>,

    /// Classroom used for lesson lookup when a detection names none
    #[arg(long, env = "ROLLCALL_CLASSROOM_CODE")]
    pub classroom_code: Option<String>,

    /// Seconds during which repeated detections of a person are ignored
    #[arg(long, env = "ROLLCALL_DEBOUNCE_SECS")]
    pub debounce_secs: Option<u64>,

    /// Log level when RUST_LOG is not set
    #[arg(long, env = "ROLLCALL_LOG_LEVEL")]
    pub log_level: Option<String>,
}

impl Args {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            bind_address: self.bind_address.clone(),
            port: self.port,
            database_path: self.database.clone(),
            api_key: self.api_key.clone(),
            public_base_url: self.public_base_url.clone(),
            uploads_dir: self.uploads_dir.clone(),
            default_classroom_code: self.classroom_code.clone(),
            debounce_window_secs: self.debounce_secs,
            log_level: self.log_level.clone(),
        }
    }
}
