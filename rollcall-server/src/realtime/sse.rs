//! Server-Sent Events transport (`GET /api/events`)
//!
//! Same frames as the WebSocket, with the event name in the SSE `event:`
//! field and the payload as `data:`.

use super::messages::ServerMessage;
use super::registry::{ConnectionId, ConnectionRegistry, Transport};
use crate::AppState;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::warn;

/// Unregisters the connection when the response stream is dropped
struct ConnectionGuard {
    id: ConnectionId,
    registry: Arc<ConnectionRegistry>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let id = self.id;
        let registry = self.registry.clone();
        tokio::spawn(async move { registry.unregister(id).await });
    }
}

/// GET /api/events
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (id, rx) = state
        .connections
        .register(Transport::Sse, &state.events)
        .await;
    let guard = ConnectionGuard {
        id,
        registry: state.connections.clone(),
    };

    let hello = ServerMessage::Connected {
        connection_id: id.to_string(),
    };
    let stream = stream::iter([hello])
        .chain(UnboundedReceiverStream::new(rx))
        .filter_map(move |message| {
            let _held = &guard;
            futures::future::ready(to_sse_event(&message).map(Ok))
        });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn to_sse_event(message: &ServerMessage) -> Option<Event> {
    match message.data_json() {
        Ok(json) => Some(Event::default().event(message.event_name()).data(json)),
        Err(e) => {
            warn!("Failed to serialize {} event: {}", message.event_name(), e);
            None
        }
    }
}
