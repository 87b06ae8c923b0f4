use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use std::collections::HashMap;
use uuid::Uuid;

use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, AppResult},
    handlers::{display_name, limit_param, text_in_range},
    hub::{RoomEvent, ServerEvent},
    models::{
        ChatPageQuery, ChatRoom, ChatRoomDetailOut, ChatRoomSummary, MessageCreate,
        MessageHistoryOut, MessageOnly, MessageOut, MessageType, NewMessage, User, UserSummary,
    },
};

pub(crate) const MAX_MESSAGE_CHARS: usize = 1000;
const RECENT_MESSAGES: i64 = 20;
const MAX_PER_PAGE: i64 = 100;
// Keeps `page * per_page` well inside i64.
const MAX_PAGE: i64 = 1_000_000;

fn page_param(value: Option<i64>) -> AppResult<i64> {
    let page = value.unwrap_or(1);
    if !(1..=MAX_PAGE).contains(&page) {
        return Err(AppError::Validation(format!(
            "page must be between 1 and {MAX_PAGE}"
        )));
    }
    Ok(page)
}

// --- Shared Chat Operations ---

/// participant_room
///
/// Loads a room the user takes part in. Unknown rooms and rooms of other people are
/// indistinguishable (404).
pub(crate) async fn participant_room(
    state: &AppState,
    room_id: Uuid,
    user_id: Uuid,
) -> AppResult<ChatRoom> {
    let room = state
        .repo
        .get_room(room_id)
        .await?
        .ok_or_else(|| AppError::not_found("Chat room"))?;
    if state.repo.get_participant(room_id, user_id).await?.is_none() {
        return Err(AppError::not_found("Chat room"));
    }
    Ok(room)
}

/// post_message
///
/// Persists a message, bumps the room, and fans the stored message out to live
/// WebSocket listeners of the room (sender included).
pub(crate) async fn post_message(
    state: &AppState,
    room_id: Uuid,
    sender: &User,
    content: String,
    message_type: MessageType,
    image_url: Option<String>,
) -> AppResult<MessageOut> {
    let message = state
        .repo
        .create_message(NewMessage {
            chat_room_id: room_id,
            sender_id: sender.id,
            content,
            message_type,
            image_url,
        })
        .await?;
    let out = MessageOut::new(message, sender.full_name());

    let listeners = state.chat.publish(
        room_id,
        RoomEvent {
            origin: None,
            skip_origin: false,
            event: ServerEvent::from(&out),
        },
    );
    tracing::debug!(room_id = %room_id, message_id = %out.id, listeners, "message posted");
    Ok(out)
}

async fn participant_summaries(state: &AppState, room_id: Uuid) -> AppResult<Vec<UserSummary>> {
    let mut summaries = Vec::new();
    for participant in state.repo.list_participants(room_id).await? {
        if let Some(user) = state.repo.get_user(participant.user_id).await? {
            summaries.push(UserSummary::from(&user));
        }
    }
    Ok(summaries)
}

async fn gig_title(state: &AppState, gig_id: Uuid) -> AppResult<String> {
    Ok(state
        .repo
        .get_gig(gig_id)
        .await?
        .map(|gig| gig.title)
        .unwrap_or_else(|| "Unknown gig".to_string()))
}

/// Resolves sender names for a batch of messages, one lookup per distinct sender.
async fn messages_out(
    state: &AppState,
    messages: Vec<crate::models::Message>,
) -> AppResult<Vec<MessageOut>> {
    let mut names: HashMap<Uuid, String> = HashMap::new();
    let mut out = Vec::with_capacity(messages.len());
    for message in messages {
        let name = match names.get(&message.sender_id) {
            Some(name) => name.clone(),
            None => {
                let name = display_name(state, message.sender_id).await?;
                names.insert(message.sender_id, name.clone());
                name
            }
        };
        out.push(MessageOut::new(message, name));
    }
    Ok(out)
}

async fn room_detail(state: &AppState, room: ChatRoom, user_id: Uuid) -> AppResult<ChatRoomDetailOut> {
    let (recent, _) = state.repo.list_messages(room.id, RECENT_MESSAGES, 0).await?;
    Ok(ChatRoomDetailOut {
        id: room.id,
        gig_id: room.gig_id,
        gig_title: gig_title(state, room.gig_id).await?,
        is_active: room.is_active,
        participants: participant_summaries(state, room.id).await?,
        recent_messages: messages_out(state, recent).await?,
        unread_count: state.repo.count_unread(room.id, user_id).await?,
        created_at: room.created_at,
        updated_at: room.updated_at,
    })
}

// --- Handlers ---

/// open_gig_room
///
/// [Authenticated Route] Returns the chat room between the caller and the gig's seeker,
/// creating it on first contact.
#[utoipa::path(
    post,
    path = "/api/chat/gigs/{gig_id}/room",
    params(("gig_id" = Uuid, Path, description = "Gig id")),
    responses(
        (status = 200, description = "Chat room", body = ChatRoomDetailOut),
        (status = 400, description = "Caller is the gig's seeker"),
        (status = 404, description = "Gig not found")
    ),
    security(("bearer" = [])),
    tag = "chat"
)]
pub async fn open_gig_room(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(gig_id): Path<Uuid>,
) -> AppResult<Json<ChatRoomDetailOut>> {
    let gig = state
        .repo
        .get_gig(gig_id)
        .await?
        .ok_or_else(|| AppError::not_found("Gig"))?;
    if gig.seeker_id == user_id {
        return Err(AppError::BadRequest(
            "Cannot open a chat with yourself about your own gig".to_string(),
        ));
    }

    let room = state
        .repo
        .get_or_create_room(gig_id, user_id, gig.seeker_id)
        .await?;
    Ok(Json(room_detail(&state, room, user_id).await?))
}

/// list_rooms
///
/// [Authenticated Route] Active rooms of the caller, most recently updated first.
#[utoipa::path(
    get,
    path = "/api/chat/rooms",
    params(ChatPageQuery),
    responses((status = 200, description = "Chat rooms", body = [ChatRoomSummary])),
    security(("bearer" = [])),
    tag = "chat"
)]
pub async fn list_rooms(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ChatPageQuery>,
) -> AppResult<Json<Vec<ChatRoomSummary>>> {
    let page = page_param(query.page)?;
    let per_page = limit_param(query.per_page, 20, MAX_PER_PAGE)?;

    let rooms = state
        .repo
        .list_user_rooms(user_id, per_page, (page - 1) * per_page)
        .await?;

    let mut summaries = Vec::with_capacity(rooms.len());
    for room in rooms {
        let (latest, _) = state.repo.list_messages(room.id, 1, 0).await?;
        summaries.push(ChatRoomSummary {
            id: room.id,
            gig_id: room.gig_id,
            gig_title: gig_title(&state, room.gig_id).await?,
            is_active: room.is_active,
            participants: participant_summaries(&state, room.id).await?,
            last_message: messages_out(&state, latest).await?.into_iter().next(),
            unread_count: state.repo.count_unread(room.id, user_id).await?,
            updated_at: room.updated_at,
        });
    }
    Ok(Json(summaries))
}

/// get_room
///
/// [Authenticated Route] Room detail with the most recent messages, newest first.
#[utoipa::path(
    get,
    path = "/api/chat/rooms/{id}",
    params(("id" = Uuid, Path, description = "Chat room id")),
    responses(
        (status = 200, description = "Chat room", body = ChatRoomDetailOut),
        (status = 404, description = "Room not found or caller not a participant")
    ),
    security(("bearer" = [])),
    tag = "chat"
)]
pub async fn get_room(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ChatRoomDetailOut>> {
    let room = participant_room(&state, id, user_id).await?;
    Ok(Json(room_detail(&state, room, user_id).await?))
}

/// get_messages
///
/// [Authenticated Route] Paged message history, newest first.
#[utoipa::path(
    get,
    path = "/api/chat/rooms/{id}/messages",
    params(("id" = Uuid, Path, description = "Chat room id"), ChatPageQuery),
    responses(
        (status = 200, description = "Message history", body = MessageHistoryOut),
        (status = 404, description = "Room not found or caller not a participant")
    ),
    security(("bearer" = [])),
    tag = "chat"
)]
pub async fn get_messages(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ChatPageQuery>,
) -> AppResult<Json<MessageHistoryOut>> {
    let page = page_param(query.page)?;
    let per_page = limit_param(query.per_page, 50, MAX_PER_PAGE)?;
    participant_room(&state, id, user_id).await?;

    let (messages, total_count) = state
        .repo
        .list_messages(id, per_page, (page - 1) * per_page)
        .await?;

    Ok(Json(MessageHistoryOut {
        messages: messages_out(&state, messages).await?,
        total_count,
        page,
        per_page,
        has_next: page * per_page < total_count,
        has_prev: page > 1,
    }))
}

/// send_message
///
/// [Authenticated Route] Posts a message to an active room. Live WebSocket clients of the
/// room receive it as well.
#[utoipa::path(
    post,
    path = "/api/chat/rooms/{id}/messages",
    params(("id" = Uuid, Path, description = "Chat room id")),
    request_body = MessageCreate,
    responses(
        (status = 201, description = "Message stored", body = MessageOut),
        (status = 404, description = "Room not found, inactive, or caller not a participant"),
        (status = 422, description = "Empty or oversized content")
    ),
    security(("bearer" = [])),
    tag = "chat"
)]
pub async fn send_message(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<MessageCreate>,
) -> AppResult<(StatusCode, Json<MessageOut>)> {
    let content = text_in_range(&payload.content, "content", 1, MAX_MESSAGE_CHARS)?;
    let room = participant_room(&state, id, user_id).await?;
    if !room.is_active {
        return Err(AppError::not_found("Chat room"));
    }
    let sender = crate::handlers::require_user(&state, user_id).await?;

    let message = post_message(
        &state,
        room.id,
        &sender,
        content,
        payload.message_type.unwrap_or_default(),
        payload.image_url,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// mark_read
///
/// [Authenticated Route] Marks everything in the room as read for the caller.
#[utoipa::path(
    put,
    path = "/api/chat/rooms/{id}/read",
    params(("id" = Uuid, Path, description = "Chat room id")),
    responses(
        (status = 200, description = "Marked read", body = MessageOnly),
        (status = 404, description = "Room not found or caller not a participant")
    ),
    security(("bearer" = [])),
    tag = "chat"
)]
pub async fn mark_read(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<MessageOnly>> {
    if !state.repo.mark_room_read(id, user_id).await? {
        return Err(AppError::not_found("Chat room"));
    }
    Ok(Json(MessageOnly::new("Messages marked as read")))
}

/// deactivate_room
///
/// [Authenticated Route] Soft-deletes a room. History stays readable; new messages are refused.
#[utoipa::path(
    delete,
    path = "/api/chat/rooms/{id}",
    params(("id" = Uuid, Path, description = "Chat room id")),
    responses(
        (status = 200, description = "Room deactivated", body = MessageOnly),
        (status = 404, description = "Room not found or caller not a participant")
    ),
    security(("bearer" = [])),
    tag = "chat"
)]
pub async fn deactivate_room(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<MessageOnly>> {
    participant_room(&state, id, user_id).await?;
    state.repo.deactivate_room(id).await?;
    tracing::info!(room_id = %id, user_id = %user_id, "chat room deactivated");
    Ok(Json(MessageOnly::new("Chat room deactivated")))
}
