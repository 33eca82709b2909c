//! Shared utilities for Dengon binaries and tests.

pub mod logger;
pub mod time;
