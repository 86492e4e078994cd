//! Detection ingestion (`POST /api/attendance`)
//!
//! Called by the recognizers once per detected face. Every accepted request
//! answers `{ok: true}`, whether the detection was stored or fell inside the
//! debounce window of an earlier one.
//!
//! Only `user_id` can fail a request. The optional fields are best effort: an
//! unusable value is logged and dropped and the detection is still stored.
//!
//! Ingestion is serialized from timestamp to event emit, so stored detections
//! are broadcast in insert order.

use axum::{body::Bytes, extract::State, Json};
use rollcall_common::api::OkResponse;
use rollcall_common::events::RollcallEvent;
use rollcall_common::time::to_epoch_ms;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::db::{self, DetectionOutcome, NewDetection};
use crate::error::ApiError;
use crate::AppState;

/// Request body as sent by the recognizers
///
/// Fields stay untyped so a bad optional value cannot reject the detection.
#[derive(Debug, Default, Deserialize)]
pub struct DetectionBody {
    #[serde(default)]
    pub user_id: Option<Value>,
    #[serde(default)]
    pub confidence: Option<Value>,
    #[serde(default)]
    pub device_label: Option<Value>,
    #[serde(default)]
    pub classroom_code: Option<Value>,
    #[serde(default)]
    pub lesson_id: Option<Value>,
}

/// POST /api/attendance
pub async fn post_attendance(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<OkResponse>, ApiError> {
    let body = parse_body(&body)?;
    let user_id = parse_user_id(body.user_id.as_ref())?;
    let confidence = parse_confidence(body.confidence.as_ref());
    let device_label = parse_text("device_label", body.device_label.as_ref());
    let classroom_code = parse_text("classroom_code", body.classroom_code.as_ref());
    let requested_lesson = parse_lesson_id(body.lesson_id.as_ref());

    let _ingest = state.ingest_lock.lock().await;

    let now = state.clock.now();
    let lesson_id = resolve_lesson(
        &state,
        requested_lesson,
        classroom_code.as_deref(),
        to_epoch_ms(now),
    )
    .await?;

    let detection = NewDetection {
        user_id,
        confidence,
        device_label,
        lesson_id,
    };

    match db::record_detection(&state.db, &detection, now, state.config.debounce_window).await? {
        DetectionOutcome::Recorded(record) => {
            info!(
                "Attendance recorded: user {} lesson {:?} device {:?}",
                record.user_id, record.lesson_id, record.device_label
            );
            state.events.emit(RollcallEvent::AttendanceRecorded {
                record_id: record.id,
                user_id: record.user_id,
                lesson_id: record.lesson_id,
                confidence: record.confidence,
                device_label: record.device_label.clone(),
                captured_at: record.captured_at_utc(),
            });
        }
        DetectionOutcome::Debounced => {
            debug!("Detection of user {} inside debounce window", user_id);
        }
    }

    Ok(Json(OkResponse::ok()))
}

/// An empty body or a JSON `null` counts as `{}`
fn parse_body(raw: &[u8]) -> Result<DetectionBody, ApiError> {
    if raw.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(DetectionBody::default());
    }

    serde_json::from_slice::<Option<DetectionBody>>(raw)
        .map(Option::unwrap_or_default)
        .map_err(|e| ApiError::Validation(format!("invalid request body: {}", e)))
}

/// Accepts a positive integer given as a JSON number or a numeric string
pub fn parse_user_id(value: Option<&Value>) -> Result<i64, ApiError> {
    let required = || ApiError::Validation("user_id required".to_string());
    let not_integer = || ApiError::Validation("user_id must be an integer".to_string());

    let id = match value {
        None | Some(Value::Null) => return Err(required()),
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                return Err(required());
            }
            s.parse::<i64>().map_err(|_| not_integer())?
        }
        Some(Value::Number(n)) => n.as_i64().ok_or_else(not_integer)?,
        Some(_) => return Err(not_integer()),
    };

    match id {
        0 => Err(required()),
        id if id < 0 => Err(ApiError::Validation(
            "user_id must be a positive integer".to_string(),
        )),
        id => Ok(id),
    }
}

/// A number or numeric string; anything else is stored as unknown
fn parse_confidence(value: Option<&Value>) -> Option<f64> {
    let parsed = match value {
        None | Some(Value::Null) => return None,
        Some(Value::String(s)) if s.trim().is_empty() => return None,
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        Some(_) => None,
    };

    if parsed.is_none() {
        warn!("Ignoring unusable confidence {}", value.map_or(serde_json::Value::Null, serde_json::Value::clone));
    }
    parsed
}

/// Trimmed non-empty text; numbers and booleans are taken as written
fn parse_text(field: &str, value: Option<&Value>) -> Option<String> {
    let text = match value {
        None | Some(Value::Null) => return None,
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(other) => {
            warn!("Ignoring {} that is not text: {}", field, other);
            return None;
        }
    };

    Some(text).filter(|t| !t.is_empty())
}

/// An integer given as a JSON number or a numeric string
fn parse_lesson_id(value: Option<&Value>) -> Option<i64> {
    let parsed = match value {
        None | Some(Value::Null) => return None,
        Some(Value::String(s)) if s.trim().is_empty() => return None,
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(_) => None,
    };

    if parsed.is_none() {
        warn!("Ignoring unusable lesson_id {}", value.map_or(serde_json::Value::Null, serde_json::Value::clone));
    }
    parsed
}

/// Lesson to tag the record with
///
/// An explicit `lesson_id` wins if it exists. Otherwise the current lesson of
/// the body's classroom, then of the configured default classroom.
async fn resolve_lesson(
    state: &AppState,
    lesson_id: Option<i64>,
    classroom_code: Option<&str>,
    now_ms: i64,
) -> Result<Option<i64>, ApiError> {
    if let Some(lesson_id) = lesson_id {
        if db::lesson_by_id(&state.db, lesson_id).await?.is_some() {
            return Ok(Some(lesson_id));
        }
        warn!("Detection names unknown lesson {}, ignoring it", lesson_id);
    }

    let fallback = state.config.default_classroom_code.as_deref();

    let mut tried: Option<&str> = None;
    for code in [classroom_code, fallback].into_iter().flatten() {
        if tried == Some(code) {
            continue;
        }
        tried = Some(code);
        if let Some(lesson) = db::current_lesson(&state.db, code, now_ms).await? {
            return Ok(Some(lesson.id));
        }
    }

    Ok(None)
}
