//! Chat engines and the chat-source registry.

pub mod engine;
pub mod errors;
pub mod registry;

pub use engine::{ChatEngine, SentMessage};
pub use errors::ChatError;
pub use registry::ChatSources;
