//! rollcall-server library
//!
//! HTTP ingestion of face detections, debounced attendance storage and live
//! presence notifications for classroom dashboards.

use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::Router;
use rollcall_common::config::ServerConfig;
use rollcall_common::events::EventBus;
use rollcall_common::time::{Clock, SystemClock};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

pub mod api;
pub mod cli;
pub mod db;
pub mod error;
pub mod realtime;

use realtime::ConnectionRegistry;

/// Events buffered per bus subscriber before it lags
pub const EVENT_BUS_CAPACITY: usize = 1024;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<ServerConfig>,
    pub events: Arc<EventBus>,
    pub connections: Arc<ConnectionRegistry>,
    /// Source of capture timestamps
    pub clock: Arc<dyn Clock>,
    /// Held by ingestion from timestamp to event emit
    pub ingest_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(db: SqlitePool, config: ServerConfig) -> Self {
        Self {
            db,
            config: Arc::new(config),
            events: Arc::new(EventBus::new(EVENT_BUS_CAPACITY)),
            connections: Arc::new(ConnectionRegistry::new()),
            clock: Arc::new(SystemClock),
            ingest_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Replace the clock, e.g. with a manual one in tests
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Start the task that forwards recorded detections to realtime clients
pub fn start_relay(state: &AppState) -> JoinHandle<()> {
    realtime::spawn_relay(&state.events, state.connections.clone())
}

/// Build application router
///
/// Only detection ingestion requires the API key. Dashboards read the
/// roster, snapshot and realtime endpoints without credentials.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};

    let device = Router::new()
        .route("/api/attendance", post(api::post_attendance))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::api_key_middleware,
        ));

    let public = Router::new()
        .route("/api/known-faces", get(api::get_known_faces))
        .route("/classrooms/by-code/:code", get(api::classroom_by_code))
        .route("/lessons/current", get(api::current_lesson))
        .route("/attendance/state", get(api::attendance_state))
        .route("/realtime", get(realtime::websocket::realtime_socket))
        .route("/api/events", get(realtime::sse::event_stream))
        .merge(api::health_routes())
        .merge(api::uploads_routes(&state.config.uploads_dir));

    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .merge(device)
        .merge(public)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Permissive when no origins are configured, else only the listed ones
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static("x-api-key"),
        ])
}
