use axum::{
    extract::{
        Path, Query, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    AppState,
    auth::authenticate_access_token,
    handlers::chat::{MAX_MESSAGE_CHARS, post_message},
    hub::{ClientEvent, RoomEvent, ServerEvent},
    models::{MessageType, User},
};

// Application close codes sent after the upgrade.
const CLOSE_ERROR: u16 = 4000;
const CLOSE_UNAUTHORIZED: u16 = 4001;
const CLOSE_FORBIDDEN: u16 = 4003;
const CLOSE_NOT_FOUND: u16 = 4004;

/// WsAuthQuery
///
/// Browsers cannot set headers on a WebSocket handshake, so the access token travels in
/// the query string.
#[derive(Debug, Deserialize, IntoParams)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

/// chat_socket
///
/// [Public Route] Upgrades to a WebSocket bound to one chat room. Authentication happens
/// after the upgrade; failures close the socket with 4001 (bad token), 4004 (room missing or
/// inactive) or 4003 (not a participant).
#[utoipa::path(
    get,
    path = "/api/ws/chat/{room_id}",
    params(("room_id" = Uuid, Path, description = "Chat room id"), WsAuthQuery),
    responses((status = 101, description = "Switching protocols")),
    tag = "chat"
)]
pub async fn chat_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Query(query): Query<WsAuthQuery>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, room_id, query.token))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, room_id: Uuid, token: Option<String>) {
    match authorize(&state, room_id, token.as_deref()).await {
        Ok(user) => run_session(socket, state, room_id, user).await,
        Err((code, reason)) => {
            tracing::debug!(room_id = %room_id, code, reason, "websocket rejected");
            let frame = CloseFrame {
                code,
                reason: reason.into(),
            };
            let _ = socket.send(Message::Close(Some(frame))).await;
        }
    }
}

/// authorize
///
/// Token, room, and membership checks, each mapped to its close code.
async fn authorize(
    state: &AppState,
    room_id: Uuid,
    token: Option<&str>,
) -> Result<User, (u16, &'static str)> {
    let token = token.ok_or((CLOSE_UNAUTHORIZED, "Authentication required"))?;
    let (user, _) = authenticate_access_token(&state.repo, &state.config, token)
        .await
        .map_err(|_| (CLOSE_UNAUTHORIZED, "Invalid token"))?;

    let room = state
        .repo
        .get_room(room_id)
        .await
        .map_err(|_| (CLOSE_ERROR, "Internal error"))?;
    if !room.is_some_and(|room| room.is_active) {
        return Err((CLOSE_NOT_FOUND, "Chat room not found"));
    }

    let participant = state
        .repo
        .get_participant(room_id, user.id)
        .await
        .map_err(|_| (CLOSE_ERROR, "Internal error"))?;
    if participant.is_none() {
        return Err((CLOSE_FORBIDDEN, "Not a participant"));
    }
    Ok(user)
}

/// run_session
///
/// Pumps frames in both directions until either side goes away: client frames are handled
/// by `handle_client_frame`, room events are forwarded unless they were meant for everyone
/// but this connection.
async fn run_session(socket: WebSocket, state: AppState, room_id: Uuid, user: User) {
    let connection_id = Uuid::new_v4();
    let user_name = user.full_name();
    let mut events = state.chat.subscribe(room_id);
    let (mut sender, mut receiver) = socket.split();

    tracing::info!(room_id = %room_id, user_id = %user.id, "websocket connected");
    state.chat.publish(
        room_id,
        RoomEvent {
            origin: Some(connection_id),
            skip_origin: true,
            event: ServerEvent::UserJoined {
                user_id: user.id,
                user_name: user_name.clone(),
            },
        },
    );

    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    handle_client_frame(&state, room_id, &user, connection_id, text.as_str()).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(room_id = %room_id, error = %e, "websocket receive failed");
                    break;
                }
            },
            event = events.recv() => match event {
                Ok(event) => {
                    if !event.visible_to(connection_id) {
                        continue;
                    }
                    let payload = match serde_json::to_string(&event.event) {
                        Ok(payload) => payload,
                        Err(e) => {
                            tracing::error!(error = %e, "failed to encode room event");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(payload.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(room_id = %room_id, skipped, "websocket listener lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    state.chat.publish(
        room_id,
        RoomEvent {
            origin: Some(connection_id),
            skip_origin: true,
            event: ServerEvent::UserLeft {
                user_id: user.id,
                user_name,
            },
        },
    );
    drop(events);
    state.chat.release(room_id);
    tracing::info!(room_id = %room_id, user_id = %user.id, "websocket disconnected");
}

/// handle_client_frame
///
/// Malformed frames, blank messages and oversized content are dropped silently.
async fn handle_client_frame(
    state: &AppState,
    room_id: Uuid,
    user: &User,
    connection_id: Uuid,
    raw: &str,
) {
    let frame: ClientEvent = match serde_json::from_str(raw) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(room_id = %room_id, error = %e, "ignoring malformed frame");
            return;
        }
    };

    match frame {
        ClientEvent::Typing { is_typing } => {
            state.chat.publish(
                room_id,
                RoomEvent {
                    origin: Some(connection_id),
                    skip_origin: true,
                    event: ServerEvent::Typing {
                        user_id: user.id,
                        user_name: user.full_name(),
                        is_typing,
                    },
                },
            );
        }
        ClientEvent::Message { content, image_url } => {
            let content = content.trim().to_string();
            let image_url = image_url.filter(|url| !url.trim().is_empty());
            if content.is_empty() && image_url.is_none() {
                return;
            }
            if content.chars().count() > MAX_MESSAGE_CHARS {
                tracing::debug!(room_id = %room_id, "ignoring oversized message");
                return;
            }

            // The room may have been deactivated since the socket was opened.
            match state.repo.get_room(room_id).await {
                Ok(Some(room)) if room.is_active => {}
                Ok(_) => return,
                Err(e) => {
                    tracing::error!(room_id = %room_id, error = %e, "room lookup failed");
                    return;
                }
            }

            let message_type = if image_url.is_some() {
                MessageType::Image
            } else {
                MessageType::Text
            };
            if let Err(e) = post_message(state, room_id, user, content, message_type, image_url).await {
                tracing::error!(room_id = %room_id, error = %e, "failed to store websocket message");
            }
        }
    }
}
