//! Database models
//!
//! Person rows are read through narrower query structs in the server.

use crate::time::from_epoch_ms;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Classroom {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub period: Option<String>,
}

/// Bounded class session; times are epoch milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Lesson {
    pub id: i64,
    pub classroom_id: i64,
    pub title: Option<String>,
    pub starts_at: i64,
    pub ends_at: i64,
}

/// One debounced detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AttendanceRecord {
    pub id: i64,
    pub user_id: i64,
    pub confidence: Option<f64>,
    pub device_label: Option<String>,
    pub lesson_id: Option<i64>,
    /// Epoch milliseconds, server-assigned
    pub captured_at: i64,
}

impl AttendanceRecord {
    pub fn captured_at_utc(&self) -> DateTime<Utc> {
        from_epoch_ms(self.captured_at)
    }
}
