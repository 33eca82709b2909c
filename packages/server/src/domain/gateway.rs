//! Ports to the auth service and to the shared pub/sub bus.

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use super::{
    error::{AuthError, BusError},
    value_object::{AuthToken, UserId},
};

/// Verifies opaque bearer tokens issued elsewhere
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Resolve a token to the identity it was issued for.
    async fn verify(&self, token: &AuthToken) -> Result<UserId, AuthError>;
}

/// Payloads received from a bus subscription
pub type BusStream = BoxStream<'static, String>;

/// Broadcast transport shared by every server instance
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish `payload` to every subscriber of `topic`, including this instance.
    async fn publish(&self, topic: &str, payload: String) -> Result<(), BusError>;

    /// Subscribe to `topic`. The stream ends when the transport goes away.
    async fn subscribe(&self, topic: &str) -> Result<BusStream, BusError>;
}
