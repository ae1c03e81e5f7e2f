use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{error, info, trace, warn};
use uuid::Uuid;

use huddle_types::ChatError;
use huddle_types::events::{Ack, AckRequest, ClientCommand, ServerEvent};

use crate::registry::ConnectionId;
use crate::router::MessageRouter;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Drive one client socket from connect to disconnect.
///
/// The connection gets a fresh session; it listens to nothing until it sends
/// `joinRoom` (or publishes a DM). On exit the session is unregistered, which
/// drops it from every channel.
pub async fn handle_connection(socket: WebSocket, router: MessageRouter) {
    let connection_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();

    let registry = router.registry().clone();
    let (_, mut events) = registry.register(connection_id).await;
    info!(
        "{} connected ({} online)",
        connection_id,
        registry.connection_count().await
    );

    // Set by the reader on Pong, cleared by the heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward queued events (fan-out + acks) -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            error!("Failed to encode event for {}: {}", connection_id, e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping {}", missed_heartbeats, connection_id);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client, one at a time
    let recv_router = router.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    handle_frame(&recv_router, connection_id, text.as_str()).await;
                }
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    registry.unregister(connection_id).await;
    info!(
        "{} disconnected ({} online)",
        connection_id,
        registry.connection_count().await
    );
}

/// Decode one text frame, run it, and ack the sender if it asked for an ack.
async fn handle_frame(router: &MessageRouter, connection_id: ConnectionId, text: &str) {
    let ack_id = serde_json::from_str::<AckRequest>(text)
        .ok()
        .and_then(|req| req.ack);

    let ack = match serde_json::from_str::<ClientCommand>(text) {
        Ok(cmd) => {
            trace!("{} -> {}", connection_id, cmd.name());
            router.handle(connection_id, cmd).await
        }
        Err(e) => {
            let raw: String = text.chars().take(200).collect();
            warn!("{} bad command: {} -- raw: {}", connection_id, e, raw);
            Ack::error(&ChatError::Validation(format!("malformed command: {e}")))
        }
    };

    if let Some(id) = ack_id {
        router
            .registry()
            .send_to(connection_id, ServerEvent::Ack(ack.with_id(id)))
            .await;
    }
}
