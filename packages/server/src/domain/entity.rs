//! Core domain models for the delivery subsystem.

use serde::{Deserialize, Serialize};

use super::value_object::{ChatId, MessageContent, MessageId, Timestamp, UserId};

/// Where a message was sent: a group chat or a single peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conversation {
    /// Group chat, fanned out to its members
    Chat(ChatId),
    /// One-to-one message to the given recipient
    Direct(UserId),
}

/// Kind of a persisted message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum MessageKind {
    /// Plain text body
    Text,
}

/// Represents a persisted message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message identifier assigned by the store
    pub id: MessageId,
    /// Sender's user ID
    pub sender: UserId,
    /// Destination of the message
    pub conversation: Conversation,
    /// Message content
    pub content: MessageContent,
    /// Message kind
    pub kind: MessageKind,
    /// Timestamp when the message was stored
    pub created_at: Timestamp,
}

impl Message {
    /// Create a new message
    pub fn new(
        id: MessageId,
        sender: UserId,
        conversation: Conversation,
        content: MessageContent,
        kind: MessageKind,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            sender,
            conversation,
            content,
            kind,
            created_at,
        }
    }

    /// Whether `user` is an addressee of this message (not its sender).
    ///
    /// For chat messages membership is decided by the caller; only direct
    /// messages can be answered here.
    pub fn is_direct_recipient(&self, user: UserId) -> bool {
        matches!(self.conversation, Conversation::Direct(recipient) if recipient == user)
    }
}
