//! WebSocket delivery server: router, session handling and lifecycle.

mod handler;
mod runner;
mod signal;
pub mod state;

pub use runner::{Ports, Server, create_router, run};
pub use signal::shutdown_signal;
