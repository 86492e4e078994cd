//! Integration tests for rollcall-server HTTP endpoints
//!
//! Tests cover:
//! - Detection ingestion: API key, validation, debounce timeline, lesson tagging
//! - Known faces URL building
//! - Classroom roster, current lesson and attendance snapshot
//! - Health and uploaded photo headers

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{DateTime, TimeZone, Utc};
use rollcall_common::config::{ConfigOverrides, ServerConfig, TomlConfig};
use rollcall_common::db::init_memory_database;
use rollcall_common::events::RollcallEvent;
use rollcall_common::time::{to_epoch_ms, ManualClock};
use rollcall_server::{build_router, AppState};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use tower::util::ServiceExt; // for `oneshot` method

const API_KEY: &str = "test-device-key";

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 7, 30, 0).unwrap()
}

fn test_config(uploads: &Path, overrides: ConfigOverrides) -> ServerConfig {
    let overrides = ConfigOverrides {
        api_key: overrides.api_key.or(Some(API_KEY.to_string())),
        uploads_dir: Some(uploads.to_path_buf()),
        ..overrides
    };
    ServerConfig::resolve(overrides, TomlConfig::default()).unwrap()
}

struct TestApp {
    state: AppState,
    clock: Arc<ManualClock>,
    _uploads: tempfile::TempDir,
}

impl TestApp {
    async fn new() -> Self {
        Self::with_overrides(ConfigOverrides::default()).await
    }

    async fn with_overrides(overrides: ConfigOverrides) -> Self {
        let uploads = tempfile::tempdir().unwrap();
        let pool = init_memory_database().await.unwrap();
        let clock = Arc::new(ManualClock::new(t0()));
        let state = AppState::new(pool, test_config(uploads.path(), overrides))
            .with_clock(clock.clone());
        Self {
            state,
            clock,
            _uploads: uploads,
        }
    }

    fn db(&self) -> &SqlitePool {
        &self.state.db
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = build_router(self.state.clone())
            .oneshot(request)
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Should read body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("Should parse JSON")
        };
        (status, json)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn post_detection(&self, key: Option<&str>, body: &str) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/attendance")
            .header("content-type", "application/json");
        if let Some(key) = key {
            builder = builder.header("X-API-Key", key);
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    async fn rows_for(&self, user_id: i64) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM attendance_logs WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(self.db())
            .await
            .unwrap()
    }

    async fn total_rows(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM attendance_logs")
            .fetch_one(self.db())
            .await
            .unwrap()
    }
}

/// One classroom with two students and a 50 minute lesson starting at t0
async fn seed_school(pool: &SqlitePool) {
    sqlx::query(
        r#"
        INSERT INTO users (id, full_name, role, profile_picture) VALUES
            (1, 'Prof. Helena', 'teacher', NULL),
            (42, 'Ana Souza', 'student', '/uploads/ana.jpg'),
            (43, 'Bruno Lima', 'student', 'uploads/bruno.jpg'),
            (44, 'Carla Dias', 'student', 'https://cdn.example.org/carla.png');
        INSERT INTO classrooms (id, code, name, period) VALUES (1, '3AT.I', 'Terceiro A', 'morning');
        INSERT INTO classroom_students (classroom_id, user_id) VALUES (1, 42), (1, 43);
        "#,
    )
    .execute(pool)
    .await
    .unwrap();

    sqlx::query(
        "INSERT INTO lessons (id, classroom_id, title, starts_at, ends_at) VALUES (7, 1, 'Matemática', ?, ?)",
    )
    .bind(to_epoch_ms(t0()))
    .bind(to_epoch_ms(t0() + chrono::Duration::minutes(50)))
    .execute(pool)
    .await
    .unwrap();
}

// =============================================================================
// Ingestion
// =============================================================================

#[tokio::test]
async fn test_debounce_timeline() {
    let app = TestApp::new().await;
    let body = r#"{"user_id": 42, "confidence": 91.2, "device_label": "cam-1"}"#;

    let (status, json) = app.post_detection(Some(API_KEY), body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"ok": true}));
    assert_eq!(app.rows_for(42).await, 1);

    app.clock.advance(chrono::Duration::seconds(30));
    let (status, json) = app.post_detection(Some(API_KEY), body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"ok": true}));
    assert_eq!(app.rows_for(42).await, 1, "detection at +30s must be debounced");

    app.clock.advance(chrono::Duration::seconds(31));
    let (status, json) = app.post_detection(Some(API_KEY), body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"ok": true}));
    assert_eq!(app.rows_for(42).await, 2);
}

#[tokio::test]
async fn test_events_only_for_stored_detections() {
    let app = TestApp::new().await;
    let mut rx = app.state.events.subscribe();
    let body = r#"{"user_id": "42", "confidence": 0.93}"#;

    app.post_detection(Some(API_KEY), body).await;
    app.clock.advance(chrono::Duration::seconds(10));
    app.post_detection(Some(API_KEY), body).await;

    let first = rx.try_recv().expect("stored detection must emit");
    match first.event {
        RollcallEvent::AttendanceRecorded {
            user_id,
            confidence,
            captured_at,
            ..
        } => {
            assert_eq!(user_id, 42);
            assert_eq!(confidence, Some(0.93));
            assert_eq!(captured_at, t0());
        }
    }
    assert!(rx.try_recv().is_err(), "debounced detection must not emit");
}

#[tokio::test]
async fn test_wrong_or_missing_key_is_rejected() {
    let app = TestApp::new().await;
    let mut rx = app.state.events.subscribe();
    let body = r#"{"user_id": 42}"#;

    for key in [None, Some("wrong"), Some(""), Some("test-device-key ")] {
        let (status, json) = app.post_detection(key, body).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "key {:?}", key);
        assert_eq!(json, json!({"error": "unauthorized"}));
    }

    assert_eq!(app.total_rows().await, 0);
    assert!(rx.try_recv().is_err());
    assert_eq!(app.state.events.last_sequence(), 0);
}

#[tokio::test]
async fn test_key_checked_before_body() {
    let app = TestApp::new().await;

    let (status, _) = app.post_detection(Some("wrong"), "{not json").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_missing_user_id() {
    let app = TestApp::new().await;

    for body in [r#"{"user_id": ""}"#, r#"{"confidence": 0.9}"#, r#"{"user_id": null}"#, ""] {
        let (status, json) = app.post_detection(Some(API_KEY), body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body {:?}", body);
        assert_eq!(json, json!({"error": "user_id required"}));
    }

    assert_eq!(app.total_rows().await, 0);
}

#[tokio::test]
async fn test_malformed_requests() {
    let app = TestApp::new().await;

    let (status, json) = app.post_detection(Some(API_KEY), r#"{"user_id": "abc"}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "user_id must be an integer");

    let (status, json) = app.post_detection(Some(API_KEY), "{oops").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().starts_with("invalid request body"));

    assert_eq!(app.total_rows().await, 0);
}

#[tokio::test]
async fn test_no_configured_key_rejects_everything() {
    let uploads = tempfile::tempdir().unwrap();
    let pool = init_memory_database().await.unwrap();
    let config = ServerConfig::resolve(
        ConfigOverrides {
            uploads_dir: Some(uploads.path().to_path_buf()),
            ..Default::default()
        },
        TomlConfig::default(),
    )
    .unwrap();
    assert!(config.api_key.is_none());

    let response = build_router(AppState::new(pool.clone(), config))
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/attendance")
                .header("X-API-Key", "")
                .body(Body::from(r#"{"user_id": 42}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM attendance_logs")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 0);
}

#[tokio::test]
async fn test_lesson_tagging() {
    let app = TestApp::new().await;
    seed_school(app.db()).await;
    app.clock.advance(chrono::Duration::minutes(5));

    app.post_detection(Some(API_KEY), r#"{"user_id": 42, "classroom_code": "3AT.I"}"#)
        .await;
    app.post_detection(Some(API_KEY), r#"{"user_id": 43}"#).await;
    app.post_detection(Some(API_KEY), r#"{"user_id": 44, "lesson_id": 7}"#)
        .await;

    let rows: Vec<(i64, Option<i64>)> =
        sqlx::query_as("SELECT user_id, lesson_id FROM attendance_logs ORDER BY user_id")
            .fetch_all(app.db())
            .await
            .unwrap();
    assert_eq!(rows, vec![(42, Some(7)), (43, None), (44, Some(7))]);
}

#[tokio::test]
async fn test_default_classroom_tags_untargeted_detections() {
    let app = TestApp::with_overrides(ConfigOverrides {
        default_classroom_code: Some("3AT.I".to_string()),
        ..Default::default()
    })
    .await;
    seed_school(app.db()).await;
    app.clock.advance(chrono::Duration::minutes(5));

    app.post_detection(Some(API_KEY), r#"{"user_id": 43, "lesson_id": 999}"#)
        .await;

    let lesson: Option<i64> =
        sqlx::query_scalar("SELECT lesson_id FROM attendance_logs WHERE user_id = 43")
            .fetch_one(app.db())
            .await
            .unwrap();
    assert_eq!(lesson, Some(7));
}

#[tokio::test]
async fn test_odd_optional_fields_do_not_reject_detection() {
    let app = TestApp::new().await;
    seed_school(app.db()).await;
    app.clock.advance(chrono::Duration::minutes(5));

    // user_id is still checked first
    let (status, json) = app.post_detection(Some(API_KEY), r#"{"device_label": 5}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json, json!({"error": "user_id required"}));

    let (status, json) = app
        .post_detection(Some(API_KEY), r#"{"user_id": 42, "device_label": 123}"#)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"ok": true}));

    let (status, _) = app
        .post_detection(Some(API_KEY), r#"{"user_id": 43, "lesson_id": "7"}"#)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .post_detection(
            Some(API_KEY),
            r#"{"user_id": 44, "confidence": "high", "classroom_code": {"x": 1}, "lesson_id": [7]}"#,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let rows: Vec<(i64, Option<String>, Option<i64>, Option<f64>)> = sqlx::query_as(
        "SELECT user_id, device_label, lesson_id, confidence FROM attendance_logs ORDER BY user_id",
    )
    .fetch_all(app.db())
    .await
    .unwrap();
    assert_eq!(
        rows,
        vec![
            (42, Some("123".to_string()), None, None),
            (43, None, Some(7), None),
            (44, None, None, None),
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_detections_are_broadcast_in_insert_order() {
    let app = TestApp::new().await;
    let mut rx = app.state.events.subscribe();

    let mut handles = Vec::new();
    for user_id in 1..=20 {
        let router = build_router(app.state.clone());
        let request = Request::builder()
            .method("POST")
            .uri("/api/attendance")
            .header("content-type", "application/json")
            .header("X-API-Key", API_KEY)
            .body(Body::from(json!({"user_id": user_id}).to_string()))
            .unwrap();
        handles.push(tokio::spawn(router.oneshot(request)));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().status(), StatusCode::OK);
    }

    let mut last_record = 0;
    let mut last_sequence = 0;
    for _ in 1..=20 {
        let sequenced = rx.try_recv().expect("every detection is broadcast");
        let RollcallEvent::AttendanceRecorded { record_id, .. } = sequenced.event;
        assert!(sequenced.sequence > last_sequence);
        assert!(
            record_id > last_record,
            "record {} broadcast after record {}",
            record_id,
            last_record
        );
        last_sequence = sequenced.sequence;
        last_record = record_id;
    }
    assert!(rx.try_recv().is_err());
}

// =============================================================================
// Known faces
// =============================================================================

#[tokio::test]
async fn test_known_faces_use_request_host() {
    let app = TestApp::new().await;
    seed_school(app.db()).await;

    let request = Request::builder()
        .uri("/api/known-faces")
        .header("host", "10.0.0.5:3001")
        .body(Body::empty())
        .unwrap();
    let (status, json) = app.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json,
        json!({"faces": [
            {"user_id": 42, "name": "Ana Souza", "photo_url": "http://10.0.0.5:3001/uploads/ana.jpg"},
            {"user_id": 43, "name": "Bruno Lima", "photo_url": "http://10.0.0.5:3001/uploads/bruno.jpg"},
            {"user_id": 44, "name": "Carla Dias", "photo_url": "https://cdn.example.org/carla.png"}
        ]})
    );
}

#[tokio::test]
async fn test_known_faces_use_public_base_url() {
    let app = TestApp::with_overrides(ConfigOverrides {
        public_base_url: Some("https://school.example.org/".to_string()),
        ..Default::default()
    })
    .await;
    seed_school(app.db()).await;

    let (_, json) = app.get("/api/known-faces").await;
    assert_eq!(
        json["faces"][0]["photo_url"],
        "https://school.example.org/uploads/ana.jpg"
    );
}

#[tokio::test]
async fn test_known_faces_empty() {
    let app = TestApp::new().await;
    let (status, json) = app.get("/api/known-faces").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"faces": []}));
}

// =============================================================================
// Roster and snapshot
// =============================================================================

#[tokio::test]
async fn test_classroom_by_code() {
    let app = TestApp::new().await;
    seed_school(app.db()).await;

    let (status, json) = app.get("/classrooms/by-code/3AT.I").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["name"], "Terceiro A");
    assert_eq!(json["period"], "morning");
    let students = json["students"].as_array().unwrap();
    assert_eq!(students.len(), 2);
    assert_eq!(students[0]["user_id"], 42);
    assert_eq!(students[0]["profile_picture"], "/uploads/ana.jpg");

    let (status, json) = app.get("/classrooms/by-code/9ZZ").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json, json!({"error": "classroom_not_found"}));
}

#[tokio::test]
async fn test_current_lesson() {
    let app = TestApp::new().await;
    seed_school(app.db()).await;

    let (status, json) = app.get("/lessons/current?classroom_code=3AT.I").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["lesson_id"], 7);
    assert_eq!(json["title"], "Matemática");
    assert_eq!(json["starts_at"], to_epoch_ms(t0()));

    app.clock.advance(chrono::Duration::minutes(50));
    let (status, json) = app.get("/lessons/current?classroom_code=3AT.I").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json,
        json!({"lesson_id": null, "title": null, "starts_at": null, "ends_at": null})
    );

    let (status, _) = app.get("/lessons/current").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_attendance_state() {
    let app = TestApp::new().await;
    seed_school(app.db()).await;

    app.clock.advance(chrono::Duration::minutes(2));
    app.post_detection(Some(API_KEY), r#"{"user_id": 42, "confidence": 80, "lesson_id": 7}"#)
        .await;
    app.clock.advance(chrono::Duration::minutes(3));
    app.post_detection(Some(API_KEY), r#"{"user_id": 42, "confidence": 95, "lesson_id": 7}"#)
        .await;
    // Untagged, but on the roster and inside the lesson
    app.post_detection(Some(API_KEY), r#"{"user_id": 43}"#).await;

    let (status, json) = app.get("/attendance/state?lesson_id=7").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["lesson_id"], 7);

    let presence = json["presence"].as_array().unwrap();
    assert_eq!(presence.len(), 2);
    assert_eq!(presence[0]["user_id"], 42);
    assert_eq!(presence[0]["detections"], 2);
    assert_eq!(presence[0]["best_confidence"], 95.0);
    assert_eq!(
        presence[0]["first_seen"],
        to_epoch_ms(t0() + chrono::Duration::minutes(2))
    );
    assert_eq!(presence[1]["user_id"], 43);

    let (status, json) = app.get("/attendance/state?lesson_id=999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json, json!({"error": "lesson_not_found"}));

    let (status, _) = app.get("/attendance/state?lesson_id=seven").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.get("/attendance/state").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Health and uploads
// =============================================================================

#[tokio::test]
async fn test_health() {
    let app = TestApp::new().await;
    let (status, json) = app.get("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["module"], "rollcall-server");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(json["connections"], 0);
}

#[tokio::test]
async fn test_uploads_are_not_cached() {
    let app = TestApp::new().await;
    std::fs::write(app.state.config.uploads_dir.join("ana.jpg"), b"jpeg bytes").unwrap();

    let response = build_router(app.state.clone())
        .oneshot(
            Request::builder()
                .uri("/uploads/ana.jpg")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers["cache-control"], "no-cache, no-store, must-revalidate");
    assert_eq!(headers["pragma"], "no-cache");
    assert_eq!(headers["expires"], "0");

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"jpeg bytes");
}
