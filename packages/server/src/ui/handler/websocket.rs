//! WebSocket upgrade handler.

use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{ConnectInfo, State, WebSocketUpgrade},
    response::IntoResponse,
};

use crate::ui::{handler::session, state::AppState};

/// Upgrade the connection; authentication happens in-band via the handshake frame.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    tracing::debug!(peer = %peer, "WebSocket upgrade requested");
    ws.max_message_size(state.session.max_message_bytes)
        .on_upgrade(move |socket| session::run(socket, state, peer))
}
