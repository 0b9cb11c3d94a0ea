//! # lc-protocol
//!
//! Shared data models for the llamachat engine.
//!
//! This crate defines all serializable structures used for:
//! - Conversion step and pipeline state
//! - Inference session state and model parameters
//! - Chat messages and the reply-state gate
//! - Persisted chat-source settings
//! - Events broadcast from the core to observers (GUI, CLI)
//!
//! ## Modules
//!
//! - [`step_models`]: Step output streams, outcomes and states
//! - [`pipeline_models`]: Pipeline lifecycle state
//! - [`session_models`]: Model kinds, parameters and session state
//! - [`message_models`]: Message records and reply state
//! - [`settings_models`]: Versioned settings payloads and chat sources
//! - [`ipc`]: Events sent from the core to observers
//! - [`bindings`]: TypeScript declarations for GUI clients
//!
//! ## Design Principles
//!
//! - Minimal dependencies: Only serde, ts-rs, uuid and chrono
//! - TypeScript generation: All types derive `TS` for client compatibility
//! - Independent compilation: No dependencies on other llamachat crates

pub mod bindings;
pub mod ipc;
pub mod message_models;
pub mod pipeline_models;
pub mod session_models;
pub mod settings_models;
pub mod step_models;

// Re-export all public types for convenience
pub use bindings::export_bindings;
pub use ipc::*;
pub use message_models::*;
pub use pipeline_models::*;
pub use session_models::*;
pub use settings_models::*;
pub use step_models::*;
