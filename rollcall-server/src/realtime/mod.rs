//! Live presence notifications
//!
//! Ingestion emits on the [`rollcall_common::events::EventBus`]; the relay
//! task turns recorded detections into [`ServerMessage`] frames and hands them
//! to the [`ConnectionRegistry`], which fans them out to every WebSocket and
//! SSE client.

pub mod messages;
pub mod registry;
pub mod relay;
pub mod sse;
pub mod websocket;

pub use messages::{ClientMessage, PresencePayload, ServerMessage};
pub use registry::{ConnectionId, ConnectionInfo, ConnectionRegistry, Transport};
pub use relay::spawn_relay;
