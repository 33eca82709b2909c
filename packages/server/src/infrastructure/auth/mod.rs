//! Auth port implementations.

pub mod jwt;

pub use jwt::{Claims, JwtTokenVerifier};
