//! API module for shared HTTP API functionality
//!
//! Contains ONLY framework-independent pieces (pure functions and shared
//! types). The server wraps them with axum extractors and responses.

pub mod auth;
pub mod types;

pub use auth::{validate_api_key, ApiAuthError, ApiKey, API_KEY_HEADER};
pub use types::{ErrorResponse, OkResponse};
