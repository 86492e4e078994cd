//! People, classrooms and lessons

use rollcall_common::db::{Classroom, Lesson};
use rollcall_common::Result;
use serde::Serialize;
use sqlx::SqlitePool;

/// Person with a stored reference photo
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct FaceRow {
    pub id: i64,
    pub full_name: String,
    pub profile_picture: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct RosterStudent {
    pub user_id: i64,
    pub full_name: String,
    pub profile_picture: Option<String>,
}

/// Everyone whose photo can be used by a recognizer, ordered by id
pub async fn known_faces(pool: &SqlitePool) -> Result<Vec<FaceRow>> {
    let rows = sqlx::query_as::<_, FaceRow>(
        r#"
        SELECT id, full_name, profile_picture
        FROM users
        WHERE profile_picture IS NOT NULL AND TRIM(profile_picture) <> ''
        ORDER BY id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn classroom_by_code(pool: &SqlitePool, code: &str) -> Result<Option<Classroom>> {
    let classroom = sqlx::query_as::<_, Classroom>(
        "SELECT id, code, name, period FROM classrooms WHERE code = ?",
    )
    .bind(code)
    .fetch_optional(pool)
    .await?;

    Ok(classroom)
}

pub async fn classroom_students(pool: &SqlitePool, classroom_id: i64) -> Result<Vec<RosterStudent>> {
    let rows = sqlx::query_as::<_, RosterStudent>(
        r#"
        SELECT u.id AS user_id, u.full_name, u.profile_picture
        FROM classroom_students cs
        JOIN users u ON u.id = cs.user_id
        WHERE cs.classroom_id = ?
        ORDER BY u.full_name, u.id
        "#,
    )
    .bind(classroom_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Lesson of the classroom running at `now_ms`
///
/// Bounds are half-open: a lesson ending at 08:20 is no longer current at
/// 08:20. When lessons overlap the one that started last wins.
pub async fn current_lesson(pool: &SqlitePool, code: &str, now_ms: i64) -> Result<Option<Lesson>> {
    let lesson = sqlx::query_as::<_, Lesson>(
        r#"
        SELECT l.id, l.classroom_id, l.title, l.starts_at, l.ends_at
        FROM lessons l
        JOIN classrooms c ON c.id = l.classroom_id
        WHERE c.code = ? AND l.starts_at <= ? AND l.ends_at > ?
        ORDER BY l.starts_at DESC, l.id DESC
        LIMIT 1
        "#,
    )
    .bind(code)
    .bind(now_ms)
    .bind(now_ms)
    .fetch_optional(pool)
    .await?;

    Ok(lesson)
}

pub async fn lesson_by_id(pool: &SqlitePool, lesson_id: i64) -> Result<Option<Lesson>> {
    let lesson = sqlx::query_as::<_, Lesson>(
        "SELECT id, classroom_id, title, starts_at, ends_at FROM lessons WHERE id = ?",
    )
    .bind(lesson_id)
    .fetch_optional(pool)
    .await?;

    Ok(lesson)
}
