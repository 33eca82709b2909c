//! Data transfer objects for the wire, the HTTP API and the bridge.

pub mod bridge;
pub mod http;
pub mod websocket;
