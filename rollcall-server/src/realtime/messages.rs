//! Frames exchanged with realtime clients
//!
//! Every frame is a JSON object `{"event": <name>, "data": <payload>}`.

use rollcall_common::events::RollcallEvent;
use rollcall_common::time::to_epoch_ms;
use serde::{Deserialize, Serialize};

pub const EVENT_CONNECTED: &str = "connected";
pub const EVENT_ATTENDANCE_PRESENT: &str = "attendance:present";

/// Payload of `attendance:present`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresencePayload {
    pub lesson_id: Option<i64>,
    pub user_id: i64,
    pub confidence: Option<f64>,
    /// Capture time, epoch milliseconds
    pub ts: i64,
}

/// Server to client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerMessage {
    #[serde(rename = "connected")]
    Connected { connection_id: String },

    #[serde(rename = "attendance:present")]
    AttendancePresent(PresencePayload),
}

impl ServerMessage {
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerMessage::Connected { .. } => EVENT_CONNECTED,
            ServerMessage::AttendancePresent(_) => EVENT_ATTENDANCE_PRESENT,
        }
    }

    /// Only the `data` part, used as the SSE event body
    pub fn data_json(&self) -> serde_json::Result<String> {
        match self {
            ServerMessage::Connected { connection_id } => {
                serde_json::to_string(&serde_json::json!({ "connection_id": connection_id }))
            }
            ServerMessage::AttendancePresent(payload) => serde_json::to_string(payload),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl From<&RollcallEvent> for ServerMessage {
    fn from(event: &RollcallEvent) -> Self {
        match event {
            RollcallEvent::AttendanceRecorded {
                user_id,
                lesson_id,
                confidence,
                captured_at,
                ..
            } => ServerMessage::AttendancePresent(PresencePayload {
                lesson_id: *lesson_id,
                user_id: *user_id,
                confidence: *confidence,
                ts: to_epoch_ms(*captured_at),
            }),
        }
    }
}

/// Client to server
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    JoinClassroom(String),
    /// Any other event name; ignored
    Other(String),
}

#[derive(Deserialize)]
struct ClientFrame {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl ClientMessage {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        let frame: ClientFrame = serde_json::from_str(text)?;
        Ok(match (frame.event.as_str(), frame.data) {
            ("join:classroom", serde_json::Value::String(code)) => {
                ClientMessage::JoinClassroom(code)
            }
            _ => ClientMessage::Other(frame.event),
        })
    }
}
