//! Inference sessions over an opaque token-generation backend.

pub mod backend;
pub mod error;
pub mod mock;
pub mod params;
#[allow(clippy::module_inception)]
pub mod session;

pub use backend::{InferenceBackend, ModelHandle, TokenStream};
pub use error::{BackendError, ErrorCode, SessionError};
pub use mock::MockBackend;
pub use params::{core_count, EffectiveParameters, MIN_CONTEXT_SIZE};
pub use session::{InferenceSession, Prediction, PredictionEvent, PredictionHandle, PredictionStream};
