//! WebSocket envelope DTOs.
//!
//! Every frame is `{"type": <kind>, "payload": {...}}`. Inbound frames decode
//! into [`ClientEnvelope`] and are validated into domain events; outbound
//! frames are built as [`ServerEnvelope`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{
    AuthToken, ChatId, ClientEvent, Conversation, Message, MessageContent, MessageId, UserId,
    ValueObjectError,
};

/// Protocol-level failures while decoding an inbound frame
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Not valid JSON, unknown type, or missing fields
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// Binary frames are not part of the protocol
    #[error("binary frames are not supported")]
    BinaryFrame,

    /// First frame of a connection was something other than a handshake
    #[error("handshake required")]
    HandshakeRequired,

    /// Handshake sent on an already authenticated connection
    #[error("already authenticated")]
    AlreadyAuthenticated,

    /// `text` must address exactly one of chat or recipient
    #[error("text requires exactly one of chat_id or recipient_id")]
    AmbiguousTarget,

    /// A field failed validation
    #[error("invalid field: {0}")]
    InvalidField(#[from] ValueObjectError),
}

/// Handshake payload: `{"token": "..."}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakePayload {
    pub token: String,
}

/// Inbound text payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextPayload {
    #[serde(default)]
    pub chat_id: Option<ChatId>,
    #[serde(default)]
    pub recipient_id: Option<UserId>,
    pub content: String,
}

/// Inbound typing payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypingPayload {
    pub chat_id: ChatId,
    #[serde(alias = "is_typing")]
    pub status: bool,
}

/// Inbound read receipt payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadPayload {
    pub message_id: MessageId,
}

/// Inbound call offer/answer payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SdpPayload {
    pub recipient_id: UserId,
    pub sdp: String,
}

/// Inbound ICE candidate payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceCandidatePayload {
    pub recipient_id: UserId,
    pub candidate: String,
}

/// Frames a client may send
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum ClientEnvelope {
    Handshake(HandshakePayload),
    Text(TextPayload),
    Typing(TypingPayload),
    Read(ReadPayload),
    CallOffer(SdpPayload),
    CallAnswer(SdpPayload),
    IceCandidate(IceCandidatePayload),
}

impl ClientEnvelope {
    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    /// Extract the bearer token from a handshake envelope.
    pub fn into_handshake_token(self) -> Result<AuthToken, ProtocolError> {
        match self {
            Self::Handshake(payload) => Ok(AuthToken::new(payload.token)?),
            _ => Err(ProtocolError::HandshakeRequired),
        }
    }

    /// Validate a post-handshake envelope into a domain event.
    pub fn into_event(self) -> Result<ClientEvent, ProtocolError> {
        match self {
            Self::Handshake(_) => Err(ProtocolError::AlreadyAuthenticated),
            Self::Text(payload) => {
                let target = match (payload.chat_id, payload.recipient_id) {
                    (Some(chat), None) => Conversation::Chat(chat),
                    (None, Some(recipient)) => Conversation::Direct(recipient),
                    _ => return Err(ProtocolError::AmbiguousTarget),
                };
                Ok(ClientEvent::Text {
                    target,
                    content: MessageContent::new(payload.content)?,
                })
            }
            Self::Typing(payload) => Ok(ClientEvent::Typing {
                chat: payload.chat_id,
                status: payload.status,
            }),
            Self::Read(payload) => Ok(ClientEvent::Read {
                message: payload.message_id,
            }),
            Self::CallOffer(payload) => Ok(ClientEvent::CallOffer {
                recipient: payload.recipient_id,
                sdp: payload.sdp,
            }),
            Self::CallAnswer(payload) => Ok(ClientEvent::CallAnswer {
                recipient: payload.recipient_id,
                sdp: payload.sdp,
            }),
            Self::IceCandidate(payload) => Ok(ClientEvent::IceCandidate {
                recipient: payload.recipient_id,
                candidate: payload.candidate,
            }),
        }
    }
}

/// Handshake acknowledgement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeAck {
    pub user_id: UserId,
}

/// Text message delivered to a recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextDelivery {
    pub message_id: MessageId,
    pub sender_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<ChatId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<UserId>,
    pub content: String,
    /// Unix timestamp (milliseconds since epoch) in JST
    pub created_at: i64,
}

/// Typing indicator delivered to chat members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingNotice {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub status: bool,
}

/// Read receipt delivered to the interested parties
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadNotice {
    pub message_id: MessageId,
    pub user_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<ChatId>,
}

/// Call offer/answer forwarded to the peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdpRelay {
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub sdp: String,
}

/// ICE candidate forwarded to the peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidateRelay {
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub candidate: String,
}

/// Error reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

/// Frames the server sends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum ServerEnvelope {
    Handshake(HandshakeAck),
    Text(TextDelivery),
    Typing(TypingNotice),
    Read(ReadNotice),
    CallOffer(SdpRelay),
    CallAnswer(SdpRelay),
    IceCandidate(IceCandidateRelay),
    Error(ErrorPayload),
}

impl ServerEnvelope {
    /// Error reply carrying `message`.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            message: message.into(),
        })
    }

    /// Text delivery for a persisted message.
    pub fn text(message: &Message) -> Self {
        let (chat_id, recipient_id) = match message.conversation {
            Conversation::Chat(chat) => (Some(chat), None),
            Conversation::Direct(recipient) => (None, Some(recipient)),
        };
        Self::Text(TextDelivery {
            message_id: message.id,
            sender_id: message.sender,
            chat_id,
            recipient_id,
            content: message.content.as_str().to_string(),
            created_at: message.created_at.value(),
        })
    }

    /// Serialize to a JSON text frame.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
