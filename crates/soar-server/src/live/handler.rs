//! WebSocket transport for the live progress channel (spec §4.6),
//! generalized from the teacher's SSE handler (`control-plane::api::events`)
//! to a bidirectional socket so clients can send `subscribe`/`unsubscribe`.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use soar_engine::bus::LiveChannel;
use soar_storage::store::RelationalStore;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use super::auth::LiveAuthenticator;
use super::messages::{translate, InboundMessage, OutboundMessage};
use super::rooms::{Membership, Room, RoomError};

#[derive(Clone)]
pub struct LiveState {
    pub channel: LiveChannel,
    pub store: Arc<dyn RelationalStore>,
    pub authenticator: Arc<LiveAuthenticator>,
    pub ping_interval: Duration,
    pub idle_timeout: Duration,
}

pub async fn live_ws_handler(ws: WebSocketUpgrade, State(state): State<LiveState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

#[instrument(skip(socket, state))]
async fn handle_socket(mut socket: WebSocket, state: LiveState) {
    let mut membership = match authenticate(&mut socket, &state).await {
        Some(membership) => membership,
        None => return,
    };

    let mut events = state.channel.subscribe();
    let mut ping = tokio::time::interval(state.ping_interval);
    let mut last_activity = tokio::time::Instant::now();

    loop {
        tokio::select! {
            _ = ping.tick() => {
                if last_activity.elapsed() > state.idle_timeout {
                    info!(organization_id = membership.organization_id(), "live channel idle timeout, closing connection");
                    break;
                }
                if socket.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            received = events.recv() => {
                match received {
                    Ok(envelope) => {
                        if envelope.organization_id != membership.organization_id() {
                            continue;
                        }
                        if !membership.is_member(&Room::Execution(envelope.execution_id)) {
                            continue;
                        }
                        if !send_json(&mut socket, &translate(envelope)).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "live channel receiver lagged; events were dropped for this connection");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        last_activity = tokio::time::Instant::now();
                        if !handle_inbound(&text, &mut socket, &mut membership, &state).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_activity = tokio::time::Instant::now();
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(%err, "live channel socket error");
                        break;
                    }
                }
            }
        }
    }
}

/// Blocks on the handshake: the first message off the socket must be
/// `authenticate`, validated against a token and cross-checked for
/// organization match (spec §4.6 connection lifecycle).
async fn authenticate(socket: &mut WebSocket, state: &LiveState) -> Option<Membership> {
    let message = socket.recv().await?;
    let text = match message {
        Ok(Message::Text(text)) => text,
        _ => {
            send_json(socket, &OutboundMessage::Error { message: "expected authenticate as the first message".into() }).await;
            return None;
        }
    };

    let parsed: InboundMessage = match serde_json::from_str(&text) {
        Ok(parsed) => parsed,
        Err(err) => {
            send_json(socket, &OutboundMessage::Error { message: format!("malformed message: {err}") }).await;
            return None;
        }
    };

    let InboundMessage::Authenticate { token, organization_id, .. } = parsed else {
        send_json(socket, &OutboundMessage::Error { message: "expected authenticate as the first message".into() }).await;
        return None;
    };

    match state.authenticator.validate(&token, organization_id) {
        Ok(claims) => {
            send_json(socket, &OutboundMessage::Authenticated { organization_id: claims.organization_id }).await;
            Some(Membership::new(claims.organization_id))
        }
        Err(err) => {
            send_json(socket, &OutboundMessage::Error { message: err.to_string() }).await;
            None
        }
    }
}

/// Handles one post-handshake inbound message. Returns `false` when the
/// connection should close.
async fn handle_inbound(text: &str, socket: &mut WebSocket, membership: &mut Membership, state: &LiveState) -> bool {
    let parsed: InboundMessage = match serde_json::from_str(text) {
        Ok(parsed) => parsed,
        Err(err) => {
            return send_json(socket, &OutboundMessage::Error { message: format!("malformed message: {err}") }).await;
        }
    };

    match parsed {
        InboundMessage::Authenticate { .. } => {
            send_json(socket, &OutboundMessage::Error { message: "already authenticated".into() }).await
        }
        InboundMessage::Ping => send_json(socket, &OutboundMessage::Pong).await,
        InboundMessage::Subscribe { room } => handle_subscribe(room, socket, membership, state).await,
        InboundMessage::Unsubscribe { room } => handle_unsubscribe(room, socket, membership).await,
    }
}

async fn handle_subscribe(room_name: String, socket: &mut WebSocket, membership: &mut Membership, state: &LiveState) -> bool {
    let room = match Room::parse(&room_name, membership.organization_id()) {
        Ok(room) => room,
        Err(err) => return send_json(socket, &OutboundMessage::Error { message: err.to_string() }).await,
    };

    if let Room::Execution(execution_id) = room {
        match state.store.get_execution(execution_id).await {
            Ok(Some(execution)) if execution.organization_id != membership.organization_id() => {
                let err = RoomError::CrossOrganization(room_name);
                return send_json(socket, &OutboundMessage::Error { message: err.to_string() }).await;
            }
            Ok(Some(_)) => {}
            Ok(None) => {
                return send_json(socket, &OutboundMessage::Error { message: format!("execution {execution_id} not found") }).await;
            }
            Err(err) => {
                return send_json(socket, &OutboundMessage::Error { message: err.to_string() }).await;
            }
        }
    }

    membership.join(room);
    send_json(socket, &OutboundMessage::Subscribed { room: room.name() }).await
}

async fn handle_unsubscribe(room_name: String, socket: &mut WebSocket, membership: &mut Membership) -> bool {
    let room = match Room::parse(&room_name, membership.organization_id()) {
        Ok(room) => room,
        Err(err) => return send_json(socket, &OutboundMessage::Error { message: err.to_string() }).await,
    };
    membership.leave(&room);
    send_json(socket, &OutboundMessage::Unsubscribed { room: room.name() }).await
}

/// Serializes and sends `message`. Returns `false` on a closed or failed
/// socket so callers can break their read loop.
async fn send_json(socket: &mut WebSocket, message: &OutboundMessage) -> bool {
    let text = match serde_json::to_string(message) {
        Ok(text) => text,
        Err(err) => {
            warn!(%err, "failed to serialize live channel message");
            return false;
        }
    };
    socket.send(Message::Text(text)).await.is_ok()
}
