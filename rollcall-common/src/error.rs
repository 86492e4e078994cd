//! Error type for the shared rollcall library
//!
//! HTTP-facing errors live in the server; everything here is a storage,
//! filesystem or startup configuration failure.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Query or connection failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A schema migration step failed; the database stays at the previous version
    #[error("Schema migration v{version} failed: {source}")]
    Migration {
        version: i32,
        #[source]
        source: sqlx::Error,
    },

    /// Database directory or config file could not be read or created
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file unreadable or a setting out of range
    #[error("Configuration error: {0}")]
    Config(String),
}
