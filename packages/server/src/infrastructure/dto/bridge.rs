//! Cross-instance bridge event DTO.

use serde::{Deserialize, Serialize};

use crate::domain::{BusError, InstanceId, UserId};

/// One fanout target, as published on the shared topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeEvent {
    /// Instance that published the event
    pub origin: InstanceId,
    /// Recipient to deliver to, if connected locally
    pub target: UserId,
    /// Serialized server envelope, forwarded verbatim
    pub frame: String,
}

impl BridgeEvent {
    /// Encode for the bus.
    pub fn encode(&self) -> Result<String, BusError> {
        serde_json::to_string(self).map_err(|e| BusError::InvalidPayload(e.to_string()))
    }

    /// Decode a payload received from the bus.
    pub fn decode(payload: &str) -> Result<Self, BusError> {
        serde_json::from_str(payload).map_err(|e| BusError::InvalidPayload(e.to_string()))
    }
}
