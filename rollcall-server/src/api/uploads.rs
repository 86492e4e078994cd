//! Uploaded photos (`GET /uploads/*`)
//!
//! Photos are replaced in place when a person gets a new picture, so every
//! response carries headers that stop browsers and recognizers from caching.

use axum::http::{header, HeaderValue};
use axum::Router;
use std::path::Path;
use tower::ServiceBuilder;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::AppState;

pub fn uploads_routes(dir: &Path) -> Router<AppState> {
    let service = ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::PRAGMA,
            HeaderValue::from_static("no-cache"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::EXPIRES,
            HeaderValue::from_static("0"),
        ))
        .service(ServeDir::new(dir));

    Router::new().nest_service("/uploads", service)
}
