use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::Message;

/// Event name for new messages in a chat.
pub fn message_create_event(chat_id: Uuid) -> String {
    format!("chat:{chat_id}:messages")
}

/// Event name for edited or soft-deleted messages in a chat.
pub fn message_update_event(chat_id: Uuid) -> String {
    format!("chat:{chat_id}:messages:update")
}

/// Event name for typing notifications in a chat.
pub fn typing_event(chat_id: Uuid) -> String {
    format!("chat:{chat_id}:typing")
}

/// Connection-level event sent once after a successful Identify.
pub const READY_EVENT: &str = "ready";

/// Events flowing through the gateway dispatcher.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, username: String },

    /// A new message was posted
    MessageCreate { message: Message },

    /// A message was edited or soft-deleted
    MessageUpdate { message: Message },

    /// A user started typing
    TypingStart {
        chat_id: Uuid,
        display_name: String,
        author_id: Uuid,
    },
}

impl GatewayEvent {
    /// The chat this event is scoped to. Connection-level events return
    /// None and are always delivered.
    pub fn chat_id(&self) -> Option<Uuid> {
        match self {
            Self::Ready { .. } => None,
            Self::MessageCreate { message } | Self::MessageUpdate { message } => {
                Some(message.scope.chat_id())
            }
            Self::TypingStart { chat_id, .. } => Some(*chat_id),
        }
    }

    /// Wire name for this event.
    pub fn event_name(&self) -> String {
        match self {
            Self::Ready { .. } => READY_EVENT.to_string(),
            Self::MessageCreate { message } => message_create_event(message.scope.chat_id()),
            Self::MessageUpdate { message } => message_update_event(message.scope.chat_id()),
            Self::TypingStart { chat_id, .. } => typing_event(*chat_id),
        }
    }

    /// Serialize into the `{event, data}` envelope sent to clients.
    pub fn to_frame(&self) -> EventFrame {
        let data = match self {
            Self::Ready { user_id, username } => serde_json::json!({
                "userId": user_id,
                "username": username,
            }),
            Self::MessageCreate { message } | Self::MessageUpdate { message } => {
                serde_json::to_value(message).unwrap_or(Value::Null)
            }
            Self::TypingStart {
                display_name,
                author_id,
                ..
            } => serde_json::to_value(TypingPayload {
                display_name: display_name.clone(),
                author_id: *author_id,
            })
            .unwrap_or(Value::Null),
        };

        EventFrame {
            event: self.event_name(),
            data,
        }
    }
}

/// Wire envelope for all server-to-client gateway traffic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    pub event: String,
    pub data: Value,
}

/// Payload carried by `chat:<id>:typing`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub display_name: String,
    pub author_id: Uuid,
}

/// Commands sent from client to server over the gateway socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Replace the set of chats this connection receives events for
    Subscribe { chat_ids: Vec<Uuid> },

    /// Notify the chat that this user is typing
    StartTyping { chat_id: Uuid },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuthorProfile, ChatScope};

    fn sample_message(chat_id: Uuid) -> Message {
        let author_id = Uuid::new_v4();
        Message {
            id: Uuid::new_v4(),
            scope: ChatScope::channel(chat_id),
            author_id,
            content: Some("hey".to_string()),
            attachment_url: None,
            deleted: false,
            created_at: "2026-01-02T03:04:05.678Z".parse().unwrap(),
            updated_at: "2026-01-02T03:04:05.678Z".parse().unwrap(),
            author: AuthorProfile {
                id: author_id,
                display_name: "bob".to_string(),
                avatar_url: None,
            },
        }
    }

    #[test]
    fn test_event_names() {
        let chat_id: Uuid = "11111111-2222-3333-4444-555555555555".parse().unwrap();
        assert_eq!(
            message_create_event(chat_id),
            "chat:11111111-2222-3333-4444-555555555555:messages"
        );
        assert_eq!(
            message_update_event(chat_id),
            "chat:11111111-2222-3333-4444-555555555555:messages:update"
        );
        assert_eq!(
            typing_event(chat_id),
            "chat:11111111-2222-3333-4444-555555555555:typing"
        );
    }

    #[test]
    fn test_create_frame_carries_full_message() {
        let chat_id = Uuid::new_v4();
        let msg = sample_message(chat_id);
        let frame = GatewayEvent::MessageCreate {
            message: msg.clone(),
        }
        .to_frame();

        assert_eq!(frame.event, message_create_event(chat_id));
        let back: Message = serde_json::from_value(frame.data).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_update_frame_uses_update_name() {
        let chat_id = Uuid::new_v4();
        let msg = sample_message(chat_id);
        let frame = GatewayEvent::MessageUpdate { message: msg }.to_frame();
        assert_eq!(frame.event, message_update_event(chat_id));
    }

    #[test]
    fn test_typing_frame_payload() {
        let chat_id = Uuid::new_v4();
        let author_id = Uuid::new_v4();
        let frame = GatewayEvent::TypingStart {
            chat_id,
            display_name: "carol".to_string(),
            author_id,
        }
        .to_frame();

        assert_eq!(frame.event, typing_event(chat_id));
        assert_eq!(frame.data["displayName"], "carol");
        assert_eq!(
            frame.data["authorId"],
            serde_json::to_value(author_id).unwrap()
        );
    }

    #[test]
    fn test_ready_event_is_unscoped() {
        let event = GatewayEvent::Ready {
            user_id: Uuid::new_v4(),
            username: "dave".to_string(),
        };
        assert_eq!(event.chat_id(), None);
        assert_eq!(event.to_frame().event, READY_EVENT);
    }

    #[test]
    fn test_command_round_trip() {
        let cmd = GatewayCommand::Subscribe {
            chat_ids: vec![Uuid::new_v4(), Uuid::new_v4()],
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("\"type\":\"Subscribe\""));
        let back: GatewayCommand = serde_json::from_str(&json).unwrap();
        match back {
            GatewayCommand::Subscribe { chat_ids } => assert_eq!(chat_ids.len(), 2),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
