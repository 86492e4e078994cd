//! HTTP API handlers for rollcall-server

pub mod api_key;
pub mod attendance;
pub mod health;
pub mod known_faces;
pub mod roster;
pub mod uploads;

pub use api_key::api_key_middleware;
pub use attendance::post_attendance;
pub use health::health_routes;
pub use known_faces::get_known_faces;
pub use roster::{attendance_state, classroom_by_code, current_lesson};
pub use uploads::uploads_routes;
