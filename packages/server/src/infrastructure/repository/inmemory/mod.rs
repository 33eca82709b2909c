//! インメモリ実装

mod message;

pub use message::InMemoryMessageRepository;
