//! Test fixtures shared by the integration tests.
//!
//! Servers run in-process on an ephemeral port. Instances that should talk to
//! each other share one [`InMemoryEventBus`].

#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use clap::Parser;
use dengon_server::{
    Ports, Server, ServerConfig,
    domain::UserId,
    infrastructure::{
        auth::JwtTokenVerifier, bridge::InMemoryEventBus, repository::InMemoryMessageRepository,
    },
};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Message, protocol::CloseFrame},
};
use tokio_util::sync::CancellationToken;

pub const SECRET: &str = "integration-test-secret-0123456789abcdef";

/// How long a test waits for an expected frame
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// In-process server stopped on drop
pub struct TestServer {
    addr: std::net::SocketAddr,
    shutdown: CancellationToken,
    verifier: JwtTokenVerifier,
}

impl TestServer {
    /// Start a standalone instance.
    pub async fn start(args: &[&str]) -> Self {
        Self::start_on_bus(Arc::new(InMemoryEventBus::default()), args).await
    }

    /// Start an instance attached to `bus`.
    ///
    /// `args` are extra command-line flags, e.g. `["--chat", "1=7,8,9"]`.
    pub async fn start_on_bus(bus: Arc<InMemoryEventBus>, args: &[&str]) -> Self {
        let mut argv = vec!["dengon-server", "--port", "0", "--jwt-secret", SECRET];
        argv.extend_from_slice(args);
        let config = ServerConfig::try_parse_from(argv).expect("Invalid test configuration");

        let repository = Arc::new(InMemoryMessageRepository::new());
        for seed in &config.chats {
            repository
                .create_chat(seed.chat, seed.members.iter().copied())
                .await;
        }

        let ports = Ports {
            verifier: Arc::new(JwtTokenVerifier::new(SECRET.as_bytes())),
            repository,
            bus,
        };
        let shutdown = CancellationToken::new();
        let server = Server::bind(&config, ports, shutdown.clone())
            .await
            .expect("Failed to bind test server");
        let addr = server.local_addr();
        tokio::spawn(server.run());

        Self {
            addr,
            shutdown,
            verifier: JwtTokenVerifier::new(SECRET.as_bytes()),
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Valid session token for `user`.
    pub fn token(&self, user: u64) -> String {
        self.verifier
            .issue(UserId::new(user), Duration::from_secs(300))
            .expect("Failed to issue token")
    }

    /// Connect and complete the handshake as `user`.
    pub async fn login(&self, user: u64) -> WsClient {
        let mut ws = self.connect().await;
        send_json(
            &mut ws,
            serde_json::json!({"type": "handshake", "payload": {"token": self.token(user)}}),
        )
        .await;
        let ack = recv_json(&mut ws).await;
        assert_eq!(ack["type"], "handshake", "unexpected first frame: {ack}");
        assert_eq!(ack["payload"]["user_id"], user);
        ws
    }

    /// Open a raw, unauthenticated connection.
    pub async fn connect(&self) -> WsClient {
        let (ws, _response) = connect_async(self.ws_url())
            .await
            .expect("Failed to connect to WebSocket");
        ws
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

pub async fn send_json(ws: &mut WsClient, value: serde_json::Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("Failed to send frame");
}

/// Next text frame as JSON, skipping control frames.
pub async fn recv_json(ws: &mut WsClient) -> serde_json::Value {
    tokio::time::timeout(RECV_TIMEOUT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str(text.as_str()).expect("Frame is not JSON");
                }
                Some(Ok(Message::Close(frame))) => panic!("Connection closed: {frame:?}"),
                Some(Ok(_)) => continue,
                Some(Err(e)) => panic!("WebSocket error: {e}"),
                None => panic!("Connection ended"),
            }
        }
    })
    .await
    .expect("Timed out waiting for a frame")
}

/// Wait for the server to close the connection, returning its close frame.
pub async fn recv_close(ws: &mut WsClient) -> Option<CloseFrame> {
    tokio::time::timeout(RECV_TIMEOUT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(frame))) => return frame,
                Some(Ok(_)) => continue,
                Some(Err(_)) | None => return None,
            }
        }
    })
    .await
    .expect("Timed out waiting for close")
}

/// Assert that no text frame arrives within `wait`.
pub async fn assert_silent(ws: &mut WsClient, wait: Duration) {
    let result = tokio::time::timeout(wait, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return text.to_string(),
                Some(Ok(_)) => continue,
                Some(Err(_)) | None => std::future::pending::<()>().await,
            }
        }
    })
    .await;
    if let Ok(text) = result {
        panic!("Expected no frame, got {text}");
    }
}
