//! Chat message models.
//!
//! A chat source's conversation is an append-only log of [`Message`]
//! records. Only generated replies are mutated after being appended, and
//! only while their generation is still in flight.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Who authored a message.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, TS)]
#[serde(rename_all = "camelCase")]
pub enum Sender {
    /// The local user.
    Me,
    /// The model, or the system on its behalf.
    Other,
}

/// Per-source gate that prevents overlapping sends.
///
/// Composing is only allowed while the gate is `None`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, TS)]
#[serde(rename_all = "camelCase")]
pub enum ReplyState {
    #[default]
    None,
    /// A prediction was issued and no token has arrived yet.
    WaitingToRespond,
    /// Tokens are streaming into the pending reply.
    Responding,
}

/// Generation status of a streamed reply.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, TS)]
#[serde(rename_all = "camelCase")]
pub enum GenerationState {
    #[default]
    Waiting,
    Generating,
    Cancelled,
    Finished,
    Error,
}

impl GenerationState {
    /// Whether the reply can no longer change.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Finished | Self::Error)
    }
}

/// Plain user or system text.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct StaticMessage {
    #[ts(type = "string")]
    pub id: Uuid,
    pub sender: Sender,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    pub is_error: bool,
}

impl StaticMessage {
    pub fn new(sender: Sender, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            content: content.into(),
            sent_at: Utc::now(),
            is_error: false,
        }
    }
}

/// A streamed assistant reply.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct GeneratedMessage {
    #[ts(type = "string")]
    pub id: Uuid,
    pub sender: Sender,

    /// Text accumulated so far, or the user-facing error text when
    /// `is_error` is set.
    pub content: String,
    pub sent_at: DateTime<Utc>,
    pub state: GenerationState,
    pub is_error: bool,
}

impl GeneratedMessage {
    /// Create an empty reply waiting for its first token.
    pub fn pending() -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: Sender::Other,
            content: String::new(),
            sent_at: Utc::now(),
            state: GenerationState::Waiting,
            is_error: false,
        }
    }
}

/// Sentinel recording that the model context was reset.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct ClearedContextMarker {
    #[ts(type = "string")]
    pub id: Uuid,
    pub sender: Sender,
    pub sent_at: DateTime<Utc>,
}

impl ClearedContextMarker {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: Sender::Me,
            sent_at: Utc::now(),
        }
    }
}

impl Default for ClearedContextMarker {
    fn default() -> Self {
        Self::new()
    }
}

/// One record in a chat source's message log.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Message {
    Static(StaticMessage),
    Generated(GeneratedMessage),
    ClearedContext(ClearedContextMarker),
}

impl Message {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Static(message) => message.id,
            Self::Generated(message) => message.id,
            Self::ClearedContext(marker) => marker.id,
        }
    }

    pub fn sender(&self) -> Sender {
        match self {
            Self::Static(message) => message.sender,
            Self::Generated(message) => message.sender,
            Self::ClearedContext(marker) => marker.sender,
        }
    }

    pub fn sent_at(&self) -> DateTime<Utc> {
        match self {
            Self::Static(message) => message.sent_at,
            Self::Generated(message) => message.sent_at,
            Self::ClearedContext(marker) => marker.sent_at,
        }
    }

    /// Message text for display. Context markers have none.
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Static(message) => Some(&message.content),
            Self::Generated(message) => Some(&message.content),
            Self::ClearedContext(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_accessors() {
        let text = StaticMessage::new(Sender::Me, "hello");
        let id = text.id;
        let message = Message::Static(text);

        assert_eq!(message.id(), id);
        assert_eq!(message.sender(), Sender::Me);
        assert_eq!(message.content(), Some("hello"));

        let marker = Message::ClearedContext(ClearedContextMarker::new());
        assert_eq!(marker.content(), None);
    }

    #[test]
    fn test_pending_reply_is_waiting() {
        let reply = GeneratedMessage::pending();
        assert_eq!(reply.state, GenerationState::Waiting);
        assert_eq!(reply.sender, Sender::Other);
        assert!(reply.content.is_empty());
        assert!(!reply.state.is_terminal());
    }

    #[test]
    fn test_message_tagged_serialization() {
        let message = Message::ClearedContext(ClearedContextMarker::new());
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "clearedContext");
        assert!(json["payload"]["id"].is_string());
    }
}
