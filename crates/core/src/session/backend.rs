//! The seam between a session and the token-generation engine.

use super::error::BackendError;
use super::params::EffectiveParameters;
use async_trait::async_trait;
use lc_protocol::session_models::{ContextSnapshot, ModelIdentity};
use std::pin::Pin;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

/// Generated text chunks, ending when generation completes.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, BackendError>> + Send>>;

/// Opaque reference to a model loaded by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelHandle(u64);

impl ModelHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// A token-generation engine that can host loaded models.
///
/// Implementations must stop yielding tokens once `cancel` passed to
/// [`predict`](InferenceBackend::predict) has fired.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Load the model file and return a handle to it.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::LoadFailed`] if the model cannot be loaded.
    async fn load_model(
        &self,
        model: &ModelIdentity,
        params: &EffectiveParameters,
    ) -> Result<ModelHandle, BackendError>;

    /// Start generating a reply to `prompt`.
    async fn predict(
        &self,
        handle: &ModelHandle,
        prompt: &str,
        cancel: CancellationToken,
    ) -> Result<TokenStream, BackendError>;

    /// The accumulated context, if the backend supports introspection.
    async fn current_context(
        &self,
        _handle: &ModelHandle,
    ) -> Result<Option<ContextSnapshot>, BackendError> {
        Ok(None)
    }

    /// Discard the accumulated context without unloading the model.
    ///
    /// Backends that cannot do this return [`BackendError::Unsupported`]
    /// and the session reloads the model instead.
    async fn reset_context(&self, _handle: &ModelHandle) -> Result<(), BackendError> {
        Err(BackendError::Unsupported)
    }

    /// Release the model.
    async fn unload(&self, _handle: &ModelHandle) {}
}
