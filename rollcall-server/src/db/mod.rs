//! Queries used by the HTTP handlers

pub mod attendance;
pub mod roster;

pub use attendance::{lesson_presence, record_detection, DetectionOutcome, NewDetection, PresenceRow};
pub use roster::{
    classroom_by_code, classroom_students, current_lesson, known_faces, lesson_by_id, FaceRow,
    RosterStudent,
};
