//! Attendance log writes and lesson snapshots
//!
//! The debounce lives in the INSERT itself: a row is written only if the same
//! user has no row inside the trailing window. SQLite runs the check and the
//! write as one statement under its single-writer lock, so two concurrent
//! requests for one user cannot both pass the check.

use chrono::{DateTime, Utc};
use rollcall_common::db::{AttendanceRecord, Lesson};
use rollcall_common::time::to_epoch_ms;
use rollcall_common::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use std::time::Duration;

/// Validated detection ready to be stored
#[derive(Debug, Clone, PartialEq)]
pub struct NewDetection {
    pub user_id: i64,
    pub confidence: Option<f64>,
    pub device_label: Option<String>,
    pub lesson_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DetectionOutcome {
    /// A new row was written
    Recorded(AttendanceRecord),
    /// The user already has a row inside the window; nothing written
    Debounced,
}

/// Store a detection unless the user was recorded within `window` before `now`
///
/// A row captured exactly `window` ago still blocks; the next accepted
/// detection must be strictly later than that.
pub async fn record_detection(
    pool: &SqlitePool,
    detection: &NewDetection,
    now: DateTime<Utc>,
    window: Duration,
) -> Result<DetectionOutcome> {
    let captured_at = to_epoch_ms(now);
    let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
    let window_start = captured_at.saturating_sub(window_ms);

    let result = sqlx::query(
        r#"
        INSERT INTO attendance_logs (user_id, confidence, device_label, lesson_id, captured_at)
        SELECT ?, ?, ?, ?, ?
        WHERE NOT EXISTS (
            SELECT 1 FROM attendance_logs
            WHERE user_id = ? AND captured_at >= ?
        )
        "#,
    )
    .bind(detection.user_id)
    .bind(detection.confidence)
    .bind(detection.device_label.as_deref())
    .bind(detection.lesson_id)
    .bind(captured_at)
    .bind(detection.user_id)
    .bind(window_start)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(DetectionOutcome::Debounced);
    }

    Ok(DetectionOutcome::Recorded(AttendanceRecord {
        id: result.last_insert_rowid(),
        user_id: detection.user_id,
        confidence: detection.confidence,
        device_label: detection.device_label.clone(),
        lesson_id: detection.lesson_id,
        captured_at,
    }))
}

/// Per-user aggregate of the detections belonging to a lesson
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct PresenceRow {
    pub user_id: i64,
    pub first_seen: i64,
    pub last_seen: i64,
    pub detections: i64,
    pub best_confidence: Option<f64>,
}

/// Everyone seen during `lesson`
///
/// Rows tagged with the lesson always count. Untagged rows count when the
/// person is on the classroom roster and the capture time falls inside the
/// lesson.
pub async fn lesson_presence(pool: &SqlitePool, lesson: &Lesson) -> Result<Vec<PresenceRow>> {
    let rows = sqlx::query_as::<_, PresenceRow>(
        r#"
        SELECT a.user_id AS user_id,
               MIN(a.captured_at) AS first_seen,
               MAX(a.captured_at) AS last_seen,
               COUNT(*) AS detections,
               MAX(a.confidence) AS best_confidence
        FROM attendance_logs a
        WHERE a.lesson_id = ?
           OR (a.lesson_id IS NULL
               AND a.captured_at >= ? AND a.captured_at < ?
               AND a.user_id IN (SELECT user_id FROM classroom_students WHERE classroom_id = ?))
        GROUP BY a.user_id
        ORDER BY first_seen, a.user_id
        "#,
    )
    .bind(lesson.id)
    .bind(lesson.starts_at)
    .bind(lesson.ends_at)
    .bind(lesson.classroom_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
