//! # lc-core
//!
//! Model conversion pipeline, inference session lifecycle and chat engine
//! for the llamachat engine.
//!
//! This crate provides:
//! - Configuration loading from the `.llamachat/` directory and settings files
//! - A sequential, skip-on-failure conversion pipeline of external steps
//! - An inference session state machine over an opaque backend
//! - A per-source chat engine with an append-only message log
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and management
//! - [`conversion`]: Steps, pipelines and the PyTorch conversion recipe
//! - [`session`]: Inference backend seam and session state machine
//! - [`chat`]: Chat engine, message log and chat-source registry
//! - [`events`]: Ordered event delivery to observers

pub mod chat;
pub mod config;
pub mod conversion;
pub mod events;
pub mod session;
