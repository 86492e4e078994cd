//! Reference photos for the recognizers (`GET /api/known-faces`)

use axum::{extract::State, http::HeaderMap, Json};
use serde::Serialize;

use crate::db;
use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnownFace {
    pub user_id: i64,
    pub name: String,
    pub photo_url: String,
}

#[derive(Debug, Serialize)]
pub struct KnownFacesResponse {
    pub faces: Vec<KnownFace>,
}

/// GET /api/known-faces
pub async fn get_known_faces(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<KnownFacesResponse>, ApiError> {
    let rows = db::known_faces(&state.db).await?;

    let base = match &state.config.public_base_url {
        Some(url) => url.clone(),
        None => request_base_url(&headers),
    };

    let faces = rows
        .into_iter()
        .map(|row| KnownFace {
            user_id: row.id,
            name: row.full_name,
            photo_url: absolutize(&base, row.profile_picture.trim()),
        })
        .collect();

    Ok(Json(KnownFacesResponse { faces }))
}

/// `<scheme>://<host>` as seen by the caller
///
/// The scheme comes from `X-Forwarded-Proto` when a proxy sets it.
pub fn request_base_url(headers: &HeaderMap) -> String {
    // A proxy chain may send "https, http"; the first hop is the client's
    let scheme = header_value(headers, "x-forwarded-proto")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("http");
    let host = header_value(headers, "host").unwrap_or("localhost");

    format!("{}://{}", scheme, host)
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Join a stored photo path onto `base`, leaving absolute URLs alone
pub fn absolutize(base: &str, path: &str) -> String {
    let lower = path.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return path.to_string();
    }

    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}
