//! Dengon real-time delivery server.
//!
//! Authenticated WebSocket sessions, per-user fanout with bounded mailboxes,
//! handshake rate limiting and a pub/sub bridge between server instances.

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod ui;
pub mod usecase;

// Re-export entry points
pub use config::ServerConfig;
pub use error::ServerError;
pub use ui::{Ports, Server, run};
