//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{Json, extract::State};
use dengon_shared::time::timestamp_to_jst_rfc3339;

use crate::{infrastructure::dto::http::StatusDto, ui::state::AppState};

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Instance status: identity, live sessions and active lockouts
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusDto> {
    Json(StatusDto {
        instance_id: state.instance_id.to_string(),
        connected_sessions: state.registry.count().await,
        active_lockouts: state.rate_limiter.lockout_count(),
        started_at: timestamp_to_jst_rfc3339(state.started_at.value()),
    })
}
