//! Infrastructure layer: adapters for the domain ports plus the in-process
//! delivery machinery (registry, rate limiter, bridge).

pub mod auth;
pub mod bridge;
pub mod dto;
pub mod rate_limiter;
pub mod registry;
pub mod repository;
