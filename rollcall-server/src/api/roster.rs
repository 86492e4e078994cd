//! Classroom roster and lesson snapshot endpoints
//!
//! The dashboard loads these once on page open and then follows the
//! realtime stream.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::db::{self, PresenceRow, RosterStudent};
use crate::error::ApiError;
use crate::AppState;
use rollcall_common::time::to_epoch_ms;

#[derive(Debug, Serialize)]
pub struct ClassroomResponse {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub period: Option<String>,
    pub students: Vec<RosterStudent>,
}

/// GET /classrooms/by-code/:code
pub async fn classroom_by_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<ClassroomResponse>, ApiError> {
    let classroom = db::classroom_by_code(&state.db, &code)
        .await?
        .ok_or_else(|| ApiError::NotFound("classroom_not_found".to_string()))?;
    let students = db::classroom_students(&state.db, classroom.id).await?;

    Ok(Json(ClassroomResponse {
        id: classroom.id,
        code: classroom.code,
        name: classroom.name,
        period: classroom.period,
        students,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CurrentLessonQuery {
    pub classroom_code: Option<String>,
}

/// All fields are null when no lesson is running
#[derive(Debug, Default, Serialize)]
pub struct CurrentLessonResponse {
    pub lesson_id: Option<i64>,
    pub title: Option<String>,
    pub starts_at: Option<i64>,
    pub ends_at: Option<i64>,
}

/// GET /lessons/current?classroom_code=
pub async fn current_lesson(
    State(state): State<AppState>,
    Query(query): Query<CurrentLessonQuery>,
) -> Result<Json<CurrentLessonResponse>, ApiError> {
    let code = query
        .classroom_code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::Validation("classroom_code required".to_string()))?;

    let now_ms = to_epoch_ms(state.clock.now());
    let response = match db::current_lesson(&state.db, code, now_ms).await? {
        Some(lesson) => CurrentLessonResponse {
            lesson_id: Some(lesson.id),
            title: lesson.title,
            starts_at: Some(lesson.starts_at),
            ends_at: Some(lesson.ends_at),
        },
        None => CurrentLessonResponse::default(),
    };

    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct AttendanceStateQuery {
    /// Kept as text so a malformed value gets our own 400 message
    pub lesson_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AttendanceStateResponse {
    pub lesson_id: i64,
    pub presence: Vec<PresenceRow>,
}

/// GET /attendance/state?lesson_id=
pub async fn attendance_state(
    State(state): State<AppState>,
    Query(query): Query<AttendanceStateQuery>,
) -> Result<Json<AttendanceStateResponse>, ApiError> {
    let lesson_id = query
        .lesson_id
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::Validation("lesson_id required".to_string()))?
        .parse::<i64>()
        .map_err(|_| ApiError::Validation("lesson_id must be an integer".to_string()))?;

    let lesson = db::lesson_by_id(&state.db, lesson_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("lesson_not_found".to_string()))?;
    let presence = db::lesson_presence(&state.db, &lesson).await?;

    Ok(Json(AttendanceStateResponse {
        lesson_id: lesson.id,
        presence,
    }))
}
