//! Persistence port.
//!
//! The delivery core never talks to storage directly; everything goes
//! through [`MessageRepository`] so an in-memory fake can stand in for tests.

use async_trait::async_trait;

use super::{
    entity::{Conversation, Message, MessageKind},
    error::RepositoryError,
    value_object::{ChatId, MessageContent, MessageId, UserId},
};

/// Storage of messages and chat membership
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Persist a new message and return it with its assigned id.
    async fn create_message(
        &self,
        sender: UserId,
        target: Conversation,
        content: MessageContent,
        kind: MessageKind,
    ) -> Result<Message, RepositoryError>;

    /// Whether `user` belongs to `chat`.
    async fn is_member(&self, user: UserId, chat: ChatId) -> Result<bool, RepositoryError>;

    /// Members of `chat` in their stored order.
    async fn chat_members(&self, chat: ChatId) -> Result<Vec<UserId>, RepositoryError>;

    /// Record that `user` has read `message`.
    async fn mark_read(&self, message: MessageId, user: UserId) -> Result<(), RepositoryError>;

    /// Messages addressed to `user` that it has not read yet, oldest first.
    async fn unread_backlog(&self, user: UserId) -> Result<Vec<Message>, RepositoryError>;

    /// Look up a single message.
    async fn find_message(&self, message: MessageId) -> Result<Message, RepositoryError>;
}
