//! UseCase 層のエラー定義

use std::time::Duration;

use thiserror::Error;

use crate::domain::{ChatId, MessageId, RepositoryError};

/// Handshake failures.
///
/// Every variant shows the client the same text; see [`Self::client_message`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeError {
    /// Token missing, malformed, or rejected by the auth service
    #[error("authentication failed")]
    Rejected,

    /// Too many recent failures from this client
    #[error("client locked out, retry in {}s", retry_after.as_secs())]
    LockedOut { retry_after: Duration },
}

impl HandshakeError {
    /// Text for the error reply. A lockout is indistinguishable from a bad token.
    pub fn client_message(&self) -> &'static str {
        "authentication failed"
    }
}

/// Errors while routing an inbound event
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// Sender does not belong to the chat
    #[error("not a member of chat {0}")]
    NotMember(ChatId),

    /// Reader is not an addressee of the message
    #[error("not a participant of message {0}")]
    NotParticipant(MessageId),

    /// Storage failed; nothing was delivered
    #[error("persistence failed: {0}")]
    Persistence(#[from] RepositoryError),

    /// Outbound frame could not be serialized
    #[error("failed to encode frame: {0}")]
    Encode(String),
}

impl RouteError {
    /// Text for the error reply sent back to the client.
    pub fn client_message(&self) -> String {
        match self {
            Self::NotMember(_) | Self::NotParticipant(_) => self.to_string(),
            Self::Persistence(RepositoryError::ChatNotFound(_))
            | Self::Persistence(RepositoryError::MessageNotFound(_)) => self.to_string(),
            Self::Persistence(RepositoryError::Unavailable(_)) => {
                "failed to store message".to_string()
            }
            Self::Encode(_) => "internal error".to_string(),
        }
    }
}
