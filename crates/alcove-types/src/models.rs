use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which kind of chat a message belongs to. Exactly one of the two
/// identifiers appears on the wire, `channelId` or `conversationId`,
/// never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatScope {
    Channel {
        #[serde(rename = "channelId")]
        channel_id: Uuid,
    },
    Conversation {
        #[serde(rename = "conversationId")]
        conversation_id: Uuid,
    },
}

impl ChatScope {
    pub fn channel(id: Uuid) -> Self {
        Self::Channel { channel_id: id }
    }

    pub fn conversation(id: Uuid) -> Self {
        Self::Conversation {
            conversation_id: id,
        }
    }

    /// The chat identifier regardless of kind. Event names and gateway
    /// subscriptions key off this.
    pub fn chat_id(&self) -> Uuid {
        match *self {
            Self::Channel { channel_id } => channel_id,
            Self::Conversation { conversation_id } => conversation_id,
        }
    }

    /// Query-string key a client uses to pass this scope.
    pub fn scope_key(&self) -> &'static str {
        match self {
            Self::Channel { .. } => "channelId",
            Self::Conversation { .. } => "conversationId",
        }
    }
}

/// Public author projection embedded in every message payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorProfile {
    pub id: Uuid,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// One chat line, as served by the read API and carried by gateway
/// events. Soft-deleted messages keep their row but lose content and
/// attachment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    #[serde(flatten)]
    pub scope: ChatScope,
    pub author_id: Uuid,
    pub content: Option<String>,
    pub attachment_url: Option<String>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author: AuthorProfile,
}

/// Trimmed projection used for prev/next neighbor references. Carries
/// everything a renderer needs for grouping decisions, minus the author
/// projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighborRef {
    pub id: Uuid,
    #[serde(flatten)]
    pub scope: ChatScope,
    pub author_id: Uuid,
    pub content: Option<String>,
    pub attachment_url: Option<String>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Message> for NeighborRef {
    fn from(m: &Message) -> Self {
        Self {
            id: m.id,
            scope: m.scope,
            author_id: m.author_id,
            content: m.content.clone(),
            attachment_url: m.attachment_url.clone(),
            deleted: m.deleted,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

/// A message annotated with its immediate chronological neighbors,
/// which may live on adjacent pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedMessage {
    #[serde(flatten)]
    pub message: Message,
    pub prev_message: Option<NeighborRef>,
    pub next_message: Option<NeighborRef>,
}

impl LinkedMessage {
    /// Wrap a bare message with no neighbor annotations. Live events and
    /// cache prepends carry none.
    pub fn bare(message: Message) -> Self {
        Self {
            message,
            prev_message: None,
            next_message: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.message.id
    }
}
