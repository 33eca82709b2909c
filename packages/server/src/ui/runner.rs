//! Server assembly and lifecycle.

use std::{net::SocketAddr, sync::Arc};

use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::{
    config::ServerConfig,
    domain::{EventBus, InstanceId, InstanceIdFactory, MessageRepository, Timestamp, TokenVerifier},
    error::ServerError,
    infrastructure::{bridge::Bridge, rate_limiter::RateLimiter, registry::ConnectionRegistry},
    ui::{
        handler::{get_status, health_check, websocket_handler},
        signal::shutdown_signal,
        state::AppState,
    },
    usecase::{
        AuthenticateUseCase, ConnectSessionUseCase, DisconnectSessionUseCase, RouteEventUseCase,
    },
};

/// External collaborators the server is wired to
pub struct Ports {
    pub verifier: Arc<dyn TokenVerifier>,
    pub repository: Arc<dyn MessageRepository>,
    pub bus: Arc<dyn EventBus>,
}

/// Build the HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/status", get(get_status))
        .route("/ws", get(websocket_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// A bound, not yet serving, server instance
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    state: Arc<AppState>,
    bridge: Arc<Bridge>,
}

impl Server {
    /// Validate `config`, bind the listener and wire all components.
    ///
    /// Cancelling `shutdown` stops the server once [`Self::run`] is awaited.
    pub async fn bind(
        config: &ServerConfig,
        ports: Ports,
        shutdown: CancellationToken,
    ) -> Result<Self, ServerError> {
        config.validate()?;

        let listener = TcpListener::bind(config.bind_addr())
            .await
            .map_err(ServerError::Bind)?;
        let local_addr = listener.local_addr().map_err(ServerError::Bind)?;

        let instance_id = InstanceIdFactory::generate();
        let registry = Arc::new(ConnectionRegistry::new());
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit_policy()));
        let bridge = Arc::new(
            Bridge::new(
                instance_id,
                config.bridge_topic.clone(),
                ports.bus,
                registry.clone(),
            )
            .with_publish_timeout(config.bridge_publish_timeout()),
        );

        let state = Arc::new(AppState {
            session: config.session_config(),
            instance_id,
            started_at: Timestamp::now(),
            registry: registry.clone(),
            rate_limiter: rate_limiter.clone(),
            authenticate: AuthenticateUseCase::new(ports.verifier, rate_limiter),
            connect: ConnectSessionUseCase::new(registry.clone(), ports.repository.clone()),
            disconnect: DisconnectSessionUseCase::new(registry.clone()),
            route: RouteEventUseCase::new(ports.repository, registry, bridge.clone()),
            shutdown,
        });

        Ok(Self {
            listener,
            local_addr,
            state,
            bridge,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn instance_id(&self) -> InstanceId {
        self.state.instance_id
    }

    /// Serve until the shutdown token is cancelled.
    pub async fn run(self) -> Result<(), ServerError> {
        let shutdown = self.state.shutdown.clone();

        let sweeper = self
            .state
            .rate_limiter
            .clone()
            .spawn_sweeper(shutdown.clone());
        let subscriber = match self.bridge.clone().spawn_subscriber(shutdown.clone()).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!("Bridge unavailable, serving local sessions only: {}", e);
                None
            }
        };

        tracing::info!(
            instance_id = %self.state.instance_id,
            "Listening on {}",
            self.local_addr
        );

        let app = create_router(self.state.clone());
        let result = axum::serve(
            self.listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await;

        // stop background tasks even if serve failed on its own
        shutdown.cancel();
        let _ = sweeper.await;
        if let Some(subscriber) = subscriber {
            let _ = subscriber.await;
        }
        tracing::info!("Server stopped");

        result.map_err(ServerError::Serve)
    }
}

/// Run a server until Ctrl-C or SIGTERM.
pub async fn run(config: ServerConfig, ports: Ports) -> Result<(), ServerError> {
    let shutdown = CancellationToken::new();
    let server = Server::bind(&config, ports, shutdown.clone()).await?;

    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.cancel();
    });

    server.run().await
}
