use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{MessageOut, MessageType};

const ROOM_CHANNEL_CAPACITY: usize = 128;

/// ServerEvent
///
/// Frames pushed to WebSocket clients, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    UserJoined {
        user_id: Uuid,
        user_name: String,
    },
    UserLeft {
        user_id: Uuid,
        user_name: String,
    },
    Message {
        message_id: Uuid,
        sender_id: Uuid,
        sender_name: String,
        content: String,
        message_type: MessageType,
        image_url: Option<String>,
        timestamp: DateTime<Utc>,
    },
    Typing {
        user_id: Uuid,
        user_name: String,
        is_typing: bool,
    },
}

impl From<&MessageOut> for ServerEvent {
    fn from(message: &MessageOut) -> Self {
        ServerEvent::Message {
            message_id: message.id,
            sender_id: message.sender_id,
            sender_name: message.sender_name.clone(),
            content: message.content.clone(),
            message_type: message.message_type,
            image_url: message.image_url.clone(),
            timestamp: message.timestamp,
        }
    }
}

/// ClientEvent
///
/// Frames accepted from WebSocket clients.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    Message {
        #[serde(default)]
        content: String,
        #[serde(default)]
        image_url: Option<String>,
    },
    Typing {
        #[serde(default)]
        is_typing: bool,
    },
}

/// RoomEvent
///
/// What travels on a room channel. `origin` is the connection that produced the event,
/// so receivers can skip echoes meant for "everyone else".
#[derive(Debug, Clone)]
pub struct RoomEvent {
    pub origin: Option<Uuid>,
    pub skip_origin: bool,
    pub event: ServerEvent,
}

impl RoomEvent {
    /// Whether the connection `connection_id` should forward this event.
    pub fn visible_to(&self, connection_id: Uuid) -> bool {
        !(self.skip_origin && self.origin == Some(connection_id))
    }
}

/// ChatHub
///
/// One broadcast channel per chat room with live connections. Messages sent over REST
/// and over WebSocket both fan out through here.
#[derive(Debug, Default)]
pub struct ChatHub {
    rooms: DashMap<Uuid, broadcast::Sender<RoomEvent>>,
}

impl ChatHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new listener on `room_id`, creating the channel on first use.
    pub fn subscribe(&self, room_id: Uuid) -> broadcast::Receiver<RoomEvent> {
        self.rooms
            .entry(room_id)
            .or_insert_with(|| broadcast::channel(ROOM_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Delivers `event` to every listener of the room. Returns the receiver count.
    pub fn publish(&self, room_id: Uuid, event: RoomEvent) -> usize {
        match self.rooms.get(&room_id) {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => 0,
        }
    }

    /// Drops the room channel once nobody listens any more.
    pub fn release(&self, room_id: Uuid) {
        self.rooms
            .remove_if(&room_id, |_, sender| sender.receiver_count() == 0);
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }

    pub fn connections(&self, room_id: Uuid) -> usize {
        self.rooms
            .get(&room_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typing(user_id: Uuid) -> ServerEvent {
        ServerEvent::Typing {
            user_id,
            user_name: "Somchai".to_string(),
            is_typing: true,
        }
    }

    #[tokio::test]
    async fn publish_reaches_all_subscribers_of_the_room_only() {
        let hub = ChatHub::new();
        let (room, other_room) = (Uuid::new_v4(), Uuid::new_v4());
        let mut first = hub.subscribe(room);
        let mut second = hub.subscribe(room);
        let mut elsewhere = hub.subscribe(other_room);

        let delivered = hub.publish(
            room,
            RoomEvent {
                origin: None,
                skip_origin: false,
                event: typing(Uuid::new_v4()),
            },
        );

        assert_eq!(delivered, 2);
        assert!(first.recv().await.is_ok());
        assert!(second.recv().await.is_ok());
        assert!(elsewhere.try_recv().is_err());
    }

    #[test]
    fn release_keeps_rooms_with_listeners() {
        let hub = ChatHub::new();
        let room = Uuid::new_v4();
        let listener = hub.subscribe(room);
        hub.release(room);
        assert_eq!(hub.active_rooms(), 1);
        drop(listener);
        hub.release(room);
        assert_eq!(hub.active_rooms(), 0);
    }

    #[test]
    fn origin_is_skipped_only_when_requested() {
        let me = Uuid::new_v4();
        let event = RoomEvent {
            origin: Some(me),
            skip_origin: true,
            event: typing(Uuid::new_v4()),
        };
        assert!(!event.visible_to(me));
        assert!(event.visible_to(Uuid::new_v4()));
    }

    #[test]
    fn client_frames_parse_by_type_tag() {
        let parsed: ClientEvent =
            serde_json::from_str(r#"{"type":"typing","is_typing":true}"#).unwrap();
        assert_eq!(parsed, ClientEvent::Typing { is_typing: true });

        let parsed: ClientEvent =
            serde_json::from_str(r#"{"type":"message","content":"hi"}"#).unwrap();
        assert_eq!(
            parsed,
            ClientEvent::Message {
                content: "hi".to_string(),
                image_url: None
            }
        );
    }
}
