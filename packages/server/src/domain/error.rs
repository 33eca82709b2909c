//! Domain layer error definitions.

use thiserror::Error;

use super::value_object::{ChatId, MessageId};

/// Errors related to Value Objects validation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueObjectError {
    /// MessageContent validation error
    #[error("MessageContent cannot be empty")]
    MessageContentEmpty,

    /// MessageContent too long error
    #[error("MessageContent cannot exceed {max} bytes (got {actual})")]
    MessageContentTooLong { max: usize, actual: usize },

    /// AuthToken validation error
    #[error("AuthToken cannot be empty")]
    AuthTokenEmpty,

    /// AuthToken too long error
    #[error("AuthToken cannot exceed {max} bytes (got {actual})")]
    AuthTokenTooLong { max: usize, actual: usize },
}

/// Errors surfaced by the persistence port
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// The referenced chat does not exist
    #[error("Chat not found: {0}")]
    ChatNotFound(ChatId),

    /// The referenced message does not exist
    #[error("Message not found: {0}")]
    MessageNotFound(MessageId),

    /// The backing store failed
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by the auth port.
///
/// Deliberately carries no detail: callers must not distinguish an unknown
/// identity from a bad or expired token.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// The token could not be verified
    #[error("invalid token")]
    InvalidToken,
}

/// Errors surfaced by the bridge transport
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The shared bus could not be reached
    #[error("Bus unavailable: {0}")]
    Unavailable(String),

    /// A bridge event could not be encoded or decoded
    #[error("Bus payload invalid: {0}")]
    InvalidPayload(String),
}
