//! Dengon delivery server.
//!
//! Run with:
//! ```not_rust
//! DENGON_JWT_SECRET=... cargo run --bin dengon-server -- --chat 1=7,8,9
//! ```

use std::sync::Arc;

use clap::Parser;
use dengon_server::{
    Ports, ServerConfig,
    domain::EventBus,
    infrastructure::{
        auth::JwtTokenVerifier,
        bridge::{InMemoryEventBus, RedisEventBus},
        repository::InMemoryMessageRepository,
    },
};
use dengon_shared::logger::setup_logger;

#[tokio::main]
async fn main() {
    let config = ServerConfig::parse();

    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "debug");

    let repository = Arc::new(InMemoryMessageRepository::new());
    for seed in &config.chats {
        repository
            .create_chat(seed.chat, seed.members.iter().copied())
            .await;
        tracing::info!(chat_id = %seed.chat, members = seed.members.len(), "Seeded chat");
    }

    let bus: Arc<dyn EventBus> = match &config.redis_url {
        Some(url) => match RedisEventBus::connect(url).await {
            Ok(bus) => Arc::new(bus),
            Err(e) => {
                tracing::error!("Redis unavailable, running without cross-instance bridge: {}", e);
                Arc::new(InMemoryEventBus::default())
            }
        },
        None => Arc::new(InMemoryEventBus::default()),
    };

    let ports = Ports {
        verifier: Arc::new(JwtTokenVerifier::new(config.jwt_secret.as_bytes())),
        repository,
        bus,
    };

    // Run the server
    if let Err(e) = dengon_server::run(config, ports).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
