//! # Rollcall Common Library
//!
//! Shared code for the rollcall attendance service:
//! - Error and result types
//! - Configuration loading (TOML bootstrap + CLI/env overrides)
//! - Clock abstraction used for debounce windows
//! - Event bus carrying "attendance recorded" notifications
//! - Database schema, migrations and row models
//! - API key validation for device callers

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
pub use time::{Clock, SystemClock};
