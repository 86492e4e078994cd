//! Shared-secret check for device endpoints
//!
//! Runs before the handler, so a request with a wrong key is rejected
//! without its body ever being read.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use rollcall_common::api::{validate_api_key, API_KEY_HEADER};
use tracing::warn;

use crate::error::ApiError;
use crate::AppState;

pub async fn api_key_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match validate_api_key(state.config.api_key.as_ref(), provided) {
        Ok(()) => Ok(next.run(request).await),
        Err(e) => {
            warn!("Rejected {} {}: {}", request.method(), request.uri().path(), e);
            Err(ApiError::Unauthorized)
        }
    }
}
