//! WebSocket transport (`GET /realtime`)

use super::messages::{ClientMessage, ServerMessage};
use super::registry::{ConnectionId, Transport};
use crate::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub const PING_INTERVAL: Duration = Duration::from_secs(30);

/// GET /realtime
pub async fn realtime_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (id, outbound) = state
        .connections
        .register(Transport::WebSocket, &state.events)
        .await;
    let (mut sink, mut stream) = socket.split();

    let hello = ServerMessage::Connected {
        connection_id: id.to_string(),
    };
    if send_frame(&mut sink, &hello).await.is_err() {
        state.connections.unregister(id).await;
        return;
    }

    let mut send_task = tokio::spawn(forward_outbound(sink, outbound, id));

    let registry = state.connections.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = stream.next().await {
            match message {
                Message::Text(text) => match ClientMessage::parse(&text) {
                    Ok(ClientMessage::JoinClassroom(code)) => {
                        registry.join_classroom(id, code).await;
                    }
                    Ok(ClientMessage::Other(event)) => {
                        debug!("Ignoring '{}' from realtime client {}", event, id);
                    }
                    Err(e) => {
                        debug!("Unparseable frame from realtime client {}: {}", id, e);
                    }
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Whichever half finishes first ends the connection
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.connections.unregister(id).await;
}

async fn forward_outbound(
    mut sink: futures::stream::SplitSink<WebSocket, Message>,
    mut outbound: mpsc::UnboundedReceiver<ServerMessage>,
    id: ConnectionId,
) {
    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.tick().await;

    loop {
        tokio::select! {
            next = outbound.recv() => {
                let Some(message) = next else { break };
                if send_frame(&mut sink, &message).await.is_err() {
                    debug!("Send to realtime client {} failed", id);
                    break;
                }
            }
            _ = ping.tick() => {
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }
}

async fn send_frame<S>(sink: &mut S, message: &ServerMessage) -> Result<(), ()>
where
    S: futures::Sink<Message> + Unpin,
{
    let json = match message.to_json() {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to serialize {} frame: {}", message.event_name(), e);
            return Ok(());
        }
    };
    sink.send(Message::Text(json)).await.map_err(|_| ())
}
