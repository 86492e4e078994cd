//! Registry of live realtime connections
//!
//! Each connection owns an unbounded queue; the socket task drains it. The
//! registry only ever pushes into queues, so a slow client never blocks the
//! fan-out. A queue whose receiver is gone marks its connection dead and the
//! connection is dropped after the fan-out finishes.

use super::messages::ServerMessage;
use chrono::{DateTime, Utc};
use rollcall_common::events::EventBus;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

pub type ConnectionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    WebSocket,
    Sse,
}

#[derive(Debug)]
struct Client {
    tx: mpsc::UnboundedSender<ServerMessage>,
    transport: Transport,
    classroom: Option<String>,
    connected_at: DateTime<Utc>,
    /// Last bus sequence emitted before this client registered
    baseline: u64,
}

/// Snapshot of one connection, for logging and health output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub transport: Transport,
    pub classroom: Option<String>,
    pub connected_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    clients: RwLock<HashMap<ConnectionId, Client>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection and return its id and outbound queue
    ///
    /// The baseline is read while the write lock is held, so an event is
    /// either emitted before the read (and skipped) or delivered after the
    /// connection is in the map.
    pub async fn register(
        &self,
        transport: Transport,
        bus: &EventBus,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();

        let mut clients = self.clients.write().await;
        let baseline = bus.last_sequence();
        clients.insert(
            id,
            Client {
                tx,
                transport,
                classroom: None,
                connected_at: Utc::now(),
                baseline,
            },
        );
        let total = clients.len();
        drop(clients);

        info!(
            "Realtime client connected: {} ({:?}, {} total)",
            id, transport, total
        );
        (id, rx)
    }

    pub async fn unregister(&self, id: ConnectionId) {
        let removed = self.clients.write().await.remove(&id);
        if removed.is_some() {
            info!("Realtime client disconnected: {}", id);
        }
    }

    /// Record the classroom a client says it is watching
    ///
    /// Returns false if the connection is no longer registered.
    pub async fn join_classroom(&self, id: ConnectionId, code: String) -> bool {
        match self.clients.write().await.get_mut(&id) {
            Some(client) => {
                info!("Realtime client {} joined classroom {}", id, code);
                client.classroom = Some(code);
                true
            }
            None => false,
        }
    }

    /// Queue `message` for every client registered before event `sequence`
    ///
    /// Returns the number of clients the message was queued for.
    pub async fn deliver(&self, sequence: u64, message: &ServerMessage) -> usize {
        let mut delivered = 0;
        let mut dead = Vec::new();

        {
            let clients = self.clients.read().await;
            for (id, client) in clients.iter() {
                if client.baseline >= sequence {
                    continue;
                }
                if client.tx.send(message.clone()).is_ok() {
                    delivered += 1;
                } else {
                    dead.push(*id);
                }
            }
        }

        if !dead.is_empty() {
            let mut clients = self.clients.write().await;
            for id in &dead {
                clients.remove(id);
                debug!("Dropped closed realtime client {}", id);
            }
        }

        delivered
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    pub async fn list(&self) -> Vec<ConnectionInfo> {
        let clients = self.clients.read().await;
        let mut infos: Vec<ConnectionInfo> = clients
            .iter()
            .map(|(id, c)| ConnectionInfo {
                id: *id,
                transport: c.transport,
                classroom: c.classroom.clone(),
                connected_at: c.connected_at,
            })
            .collect();
        infos.sort_by_key(|i| i.connected_at);
        infos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::messages::PresencePayload;
    use chrono::Utc;
    use rollcall_common::events::RollcallEvent;

    fn presence(user_id: i64) -> ServerMessage {
        ServerMessage::AttendancePresent(PresencePayload {
            lesson_id: None,
            user_id,
            confidence: Some(90.0),
            ts: 1_000,
        })
    }

    fn recorded(user_id: i64) -> RollcallEvent {
        RollcallEvent::AttendanceRecorded {
            record_id: 1,
            user_id,
            lesson_id: None,
            confidence: None,
            device_label: None,
            captured_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_every_registered_client_gets_one_copy() {
        let bus = EventBus::new(16);
        let registry = ConnectionRegistry::new();

        let (_, mut a) = registry.register(Transport::WebSocket, &bus).await;
        let (_, mut b) = registry.register(Transport::Sse, &bus).await;

        let seq = bus.emit(recorded(42));
        assert_eq!(registry.deliver(seq, &presence(42)).await, 2);

        assert_eq!(a.try_recv().unwrap(), presence(42));
        assert_eq!(b.try_recv().unwrap(), presence(42));
        assert!(a.try_recv().is_err());
        assert!(b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_late_client_does_not_get_earlier_event() {
        let bus = EventBus::new(16);
        let registry = ConnectionRegistry::new();

        let (_, mut early) = registry.register(Transport::WebSocket, &bus).await;
        let seq = bus.emit(recorded(1));
        let (_, mut late) = registry.register(Transport::WebSocket, &bus).await;

        assert_eq!(registry.deliver(seq, &presence(1)).await, 1);
        assert!(early.try_recv().is_ok());
        assert!(late.try_recv().is_err());

        let next = bus.emit(recorded(2));
        registry.deliver(next, &presence(2)).await;
        assert_eq!(late.try_recv().unwrap(), presence(2));
    }

    #[tokio::test]
    async fn test_closed_client_is_removed_without_affecting_others() {
        let bus = EventBus::new(16);
        let registry = ConnectionRegistry::new();

        let (_, closed) = registry.register(Transport::WebSocket, &bus).await;
        let (_, mut open) = registry.register(Transport::WebSocket, &bus).await;
        drop(closed);

        let seq = bus.emit(recorded(9));
        assert_eq!(registry.deliver(seq, &presence(9)).await, 1);
        assert_eq!(open.try_recv().unwrap(), presence(9));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_join_and_unregister() {
        let bus = EventBus::new(16);
        let registry = ConnectionRegistry::new();

        let (id, _rx) = registry.register(Transport::WebSocket, &bus).await;
        assert!(registry.join_classroom(id, "3AT.I".to_string()).await);

        let listed = registry.list().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].classroom.as_deref(), Some("3AT.I"));
        assert_eq!(listed[0].transport, Transport::WebSocket);

        registry.unregister(id).await;
        assert!(registry.is_empty().await);
        assert!(!registry.join_classroom(id, "3AT.I".to_string()).await);
    }
}
