use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::user::UserSummary;

/// MessageType
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, sqlx::Type, Default)]
#[sqlx(type_name = "message_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum MessageType {
    #[default]
    Text,
    Image,
    System,
}

/// ChatRoom
///
/// A conversation attached to a gig. Rooms are never hard-deleted; `is_active=false`
/// hides them from listings and rejects new messages.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct ChatRoom {
    pub id: Uuid,
    pub gig_id: Uuid,
    pub is_active: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// ChatParticipant
///
/// Membership row. `last_read_at` drives the unread counters.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct ChatParticipant {
    pub id: Uuid,
    pub chat_room_id: Uuid,
    pub user_id: Uuid,
    #[ts(type = "string")]
    pub joined_at: DateTime<Utc>,
    #[ts(type = "string | null")]
    pub last_read_at: Option<DateTime<Utc>>,
}

/// Message
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Message {
    pub id: Uuid,
    pub chat_room_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub message_type: MessageType,
    pub image_url: Option<String>,
    pub is_read: bool,
    #[ts(type = "string")]
    pub timestamp: DateTime<Utc>,
}

/// NewMessage
///
/// Validated insert payload shared by the REST and WebSocket paths.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub chat_room_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub message_type: MessageType,
    pub image_url: Option<String>,
}

// --- Request Payloads ---

/// MessageCreate
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MessageCreate {
    pub content: String,
    pub message_type: Option<MessageType>,
    pub image_url: Option<String>,
}

/// ChatPageQuery
///
/// 1-based page pagination used by the chat endpoints.
#[derive(Debug, Clone, Deserialize, IntoParams, Default)]
pub struct ChatPageQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

// --- Response Schemas ---

/// MessageOut
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MessageOut {
    pub id: Uuid,
    pub chat_room_id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub content: String,
    pub message_type: MessageType,
    pub image_url: Option<String>,
    pub is_read: bool,
    #[ts(type = "string")]
    pub timestamp: DateTime<Utc>,
}

impl MessageOut {
    pub fn new(message: Message, sender_name: String) -> Self {
        Self {
            id: message.id,
            chat_room_id: message.chat_room_id,
            sender_id: message.sender_id,
            sender_name,
            content: message.content,
            message_type: message.message_type,
            image_url: message.image_url,
            is_read: message.is_read,
            timestamp: message.timestamp,
        }
    }
}

/// ChatRoomSummary
///
/// One row of the caller's inbox.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ChatRoomSummary {
    pub id: Uuid,
    pub gig_id: Uuid,
    pub gig_title: String,
    pub is_active: bool,
    pub participants: Vec<UserSummary>,
    pub last_message: Option<MessageOut>,
    pub unread_count: i64,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// ChatRoomDetailOut
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ChatRoomDetailOut {
    pub id: Uuid,
    pub gig_id: Uuid,
    pub gig_title: String,
    pub is_active: bool,
    pub participants: Vec<UserSummary>,
    pub recent_messages: Vec<MessageOut>,
    pub unread_count: i64,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// MessageHistoryOut
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MessageHistoryOut {
    pub messages: Vec<MessageOut>,
    pub total_count: i64,
    pub page: i64,
    pub per_page: i64,
    pub has_next: bool,
    pub has_prev: bool,
}
