//! Configuration loading.
//!
//! Global settings live in `.llamachat/config.toml`; chat sources are
//! persisted as a versioned JSON payload.

pub mod error;
pub mod loader;
pub mod models;
