//! Event bus to realtime clients

use super::messages::ServerMessage;
use super::registry::ConnectionRegistry;
use rollcall_common::events::{EventBus, RollcallEvent};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Start forwarding recorded detections to connected clients
///
/// The subscription is taken before the task is spawned, so nothing emitted
/// after this call returns is missed. The task ends when the bus is dropped.
pub fn spawn_relay(bus: &EventBus, registry: Arc<ConnectionRegistry>) -> JoinHandle<()> {
    let mut rx = bus.subscribe();

    tokio::spawn(async move {
        info!("Realtime relay started");

        loop {
            match rx.recv().await {
                Ok(sequenced) => match &sequenced.event {
                    RollcallEvent::AttendanceRecorded { user_id, .. } => {
                        let message = ServerMessage::from(&sequenced.event);
                        let delivered = registry.deliver(sequenced.sequence, &message).await;
                        debug!(
                            "{} user {} (seq {}) sent to {} client(s)",
                            sequenced.event.event_type(),
                            user_id,
                            sequenced.sequence,
                            delivered
                        );
                    }
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Realtime relay lagged, {} event(s) not delivered", skipped);
                }
                Err(RecvError::Closed) => {
                    info!("Event bus closed, realtime relay stopping");
                    break;
                }
            }
        }
    })
}
