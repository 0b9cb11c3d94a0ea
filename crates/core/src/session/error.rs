//! Error types for inference sessions and backends.

use lc_protocol::session_models::SessionState;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of failures, used for user-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    FailedToLoadModel,
    FailedToPredict,
    Unknown,
}

/// Errors reported by an inference backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The model file could not be loaded.
    #[error("Failed to load model at {path}: {reason}")]
    LoadFailed { path: PathBuf, reason: String },

    /// Token generation failed part way through.
    #[error("Prediction failed: {0}")]
    PredictionFailed(String),

    /// The backend does not implement the requested operation.
    #[error("Operation not supported by backend")]
    Unsupported,

    /// The handle does not refer to a loaded model.
    #[error("Model handle is not loaded")]
    InvalidHandle,

    #[error("Backend error: {0}")]
    Other(String),
}

impl BackendError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::LoadFailed { .. } => ErrorCode::FailedToLoadModel,
            Self::PredictionFailed(_) | Self::InvalidHandle => ErrorCode::FailedToPredict,
            Self::Unsupported | Self::Other(_) => ErrorCode::Unknown,
        }
    }
}

/// Errors from driving an inference session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The model failed to load; the session must be recreated.
    #[error("Session failed: {reason}")]
    Failed { reason: String },

    /// A prediction is already in flight.
    #[error("Session is busy")]
    Busy,

    #[error("Session cannot do that from state {0:?}")]
    InvalidState(SessionState),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl SessionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Failed { .. } => ErrorCode::FailedToLoadModel,
            Self::Backend(e) => e.code(),
            Self::Busy | Self::InvalidState(_) => ErrorCode::Unknown,
        }
    }
}
