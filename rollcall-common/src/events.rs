//! Event types and EventBus for rollcall
//!
//! The ingestion endpoint emits [`RollcallEvent::AttendanceRecorded`] after a
//! detection is persisted. The realtime relay subscribes independently and
//! turns those events into `attendance:present` frames.
//!
//! Every emitted event carries a sequence number. Sequence numbers are
//! assigned under the same lock that sends the event, so sequence order is
//! channel order. Connections remember the last sequence at the time they
//! registered and are only sent events with a higher number.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Rollcall event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RollcallEvent {
    /// A detection passed the debounce window and was stored
    AttendanceRecorded {
        /// Row id in attendance_logs
        record_id: i64,
        /// Person that was detected
        user_id: i64,
        /// Lesson the record was associated with, if any
        lesson_id: Option<i64>,
        /// Recognizer score, unit defined by the caller
        confidence: Option<f64>,
        /// Capture device tag
        device_label: Option<String>,
        /// Server-assigned capture time
        captured_at: DateTime<Utc>,
    },
}

impl RollcallEvent {
    /// Event name used in logs
    pub fn event_type(&self) -> &'static str {
        match self {
            RollcallEvent::AttendanceRecorded { .. } => "AttendanceRecorded",
        }
    }
}

/// Event paired with its bus sequence number
#[derive(Debug, Clone)]
pub struct SequencedEvent {
    pub sequence: u64,
    pub event: RollcallEvent,
}

/// One-to-many event distribution (tokio::broadcast)
#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<SequencedEvent>,
    last_sequence: Mutex<u64>,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    ///
    /// # Examples
    ///
    /// ```
    /// use rollcall_common::events::EventBus;
    ///
    /// let bus = EventBus::new(256);
    /// assert_eq!(bus.last_sequence(), 0);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            last_sequence: Mutex::new(0),
        }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<SequencedEvent> {
        self.tx.subscribe()
    }

    /// Emit an event and return the sequence number it was given
    ///
    /// Having no subscribers is not an error: the event is still numbered so
    /// connections registering later will not receive it.
    pub fn emit(&self, event: RollcallEvent) -> u64 {
        let mut last = self
            .last_sequence
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *last += 1;
        let sequence = *last;
        let _ = self.tx.send(SequencedEvent { sequence, event });
        sequence
    }

    /// Sequence number of the most recently emitted event (0 before the first)
    pub fn last_sequence(&self) -> u64 {
        *self
            .last_sequence
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}
