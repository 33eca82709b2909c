//! Domain layer for the delivery subsystem.
//!
//! This module contains business types and the ports the core consumes.
//! It is independent of data transfer objects (DTOs) and infrastructure concerns.

pub mod entity;
pub mod error;
pub mod event;
pub mod factory;
pub mod gateway;
pub mod repository;
pub mod value_object;

pub use entity::{Conversation, Message, MessageKind};
pub use error::{AuthError, BusError, RepositoryError, ValueObjectError};
pub use event::ClientEvent;
pub use factory::InstanceIdFactory;
pub use gateway::{BusStream, EventBus, TokenVerifier};
pub use repository::MessageRepository;
pub use value_object::{
    AuthToken, ChatId, InstanceId, MessageContent, MessageId, RateLimitKey, Timestamp, UserId,
};
