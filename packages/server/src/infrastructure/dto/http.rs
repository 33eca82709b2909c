//! HTTP API response DTOs.

use serde::{Deserialize, Serialize};

/// Instance status for the observability endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusDto {
    pub instance_id: String,
    /// Locally connected, authenticated sessions
    pub connected_sessions: usize,
    /// Rate-limit keys currently locked out
    pub active_lockouts: usize,
    pub started_at: String, // ISO 8601
}
