//! Inbound events accepted from an authenticated session.
//!
//! Every variant is fully validated: once a frame has been turned into a
//! `ClientEvent`, routing never needs to inspect raw JSON again.

use super::{
    entity::Conversation,
    value_object::{ChatId, MessageContent, MessageId, UserId},
};

/// Validated inbound event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Text message to a chat or a single peer
    Text {
        target: Conversation,
        content: MessageContent,
    },
    /// Typing indicator inside a chat
    Typing { chat: ChatId, status: bool },
    /// Read receipt for a persisted message
    Read { message: MessageId },
    /// WebRTC offer for a peer
    CallOffer { recipient: UserId, sdp: String },
    /// WebRTC answer for a peer
    CallAnswer { recipient: UserId, sdp: String },
    /// ICE candidate for a peer
    IceCandidate { recipient: UserId, candidate: String },
}

impl ClientEvent {
    /// Wire name of the event kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Typing { .. } => "typing",
            Self::Read { .. } => "read",
            Self::CallOffer { .. } => "call-offer",
            Self::CallAnswer { .. } => "call-answer",
            Self::IceCandidate { .. } => "ice-candidate",
        }
    }
}
