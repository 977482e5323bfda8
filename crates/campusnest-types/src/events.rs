use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::NotificationKind;

/// Events pushed over a live connection. Flat JSON objects tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
    /// Sent once after the connection is registered
    Ready { user_id: Uuid },

    /// A direct message was persisted for this user
    NewMessage {
        message_id: i64,
        sender_id: Uuid,
        sender_name: String,
        body: String,
        property_id: Option<Uuid>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The counterpart started or stopped typing
    Typing { user_id: Uuid, is_typing: bool },

    /// Opaque payload relayed from another connection, never persisted
    Message {
        sender_id: Uuid,
        payload: serde_json::Value,
    },

    /// A notification record was created for this user
    Notification {
        id: i64,
        kind: NotificationKind,
        title: String,
        body: String,
        related_id: Option<String>,
    },
}

impl LiveEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::NewMessage { .. } => "new_message",
            Self::Typing { .. } => "typing",
            Self::Message { .. } => "message",
            Self::Notification { .. } => "notification",
        }
    }
}

/// Frames sent FROM client TO server over the live connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelCommand {
    /// Relay an arbitrary payload to another user
    Message {
        recipient_id: Uuid,
        #[serde(default)]
        payload: serde_json::Value,
    },

    /// Typing indicator for the conversation with `recipient_id`
    Typing {
        recipient_id: Uuid,
        #[serde(default = "default_typing")]
        is_typing: bool,
    },
}

fn default_typing() -> bool {
    true
}
