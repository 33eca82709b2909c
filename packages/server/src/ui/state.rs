//! Shared application state.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    config::SessionConfig,
    domain::{InstanceId, Timestamp},
    infrastructure::{rate_limiter::RateLimiter, registry::ConnectionRegistry},
    usecase::{
        AuthenticateUseCase, ConnectSessionUseCase, DisconnectSessionUseCase, RouteEventUseCase,
    },
};

/// Shared application state
pub struct AppState {
    /// Per-session timing and sizing
    pub session: SessionConfig,
    /// This instance's identity on the bridge
    pub instance_id: InstanceId,
    /// Unix timestamp when the server started (in JST, milliseconds)
    pub started_at: Timestamp,
    /// 接続中セッションのレジストリ
    pub registry: Arc<ConnectionRegistry>,
    /// ハンドシェイク失敗のレートリミッタ
    pub rate_limiter: Arc<RateLimiter>,
    pub authenticate: AuthenticateUseCase,
    pub connect: ConnectSessionUseCase,
    pub disconnect: DisconnectSessionUseCase,
    pub route: RouteEventUseCase,
    /// Cancelled when the server shuts down
    pub shutdown: CancellationToken,
}
