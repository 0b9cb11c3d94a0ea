//! Chat errors and the user-facing strings shown for failed replies.

use crate::session::{BackendError, ErrorCode, SessionError};
use thiserror::Error;

pub const FAILED_TO_LOAD_MODEL: &str = "Failed to load model";
pub const FAILED_TO_GENERATE_RESPONSE: &str = "Failed to generate response";
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Errors from chat-engine and chat-source operations.
#[derive(Error, Debug)]
pub enum ChatError {
    /// A reply is still pending; the composer should not have allowed this.
    #[error("A reply is already in progress")]
    Busy,

    #[error("Unknown chat source '{0}'")]
    UnknownSource(String),

    #[error("Chat source '{0}' already exists")]
    DuplicateSource(String),
}

/// The fixed string displayed for an error code.
pub fn user_message(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::FailedToLoadModel => FAILED_TO_LOAD_MODEL,
        ErrorCode::FailedToPredict => FAILED_TO_GENERATE_RESPONSE,
        ErrorCode::Unknown => UNKNOWN_ERROR,
    }
}

pub fn session_error_message(err: &SessionError) -> &'static str {
    user_message(err.code())
}

pub fn backend_error_message(err: &BackendError) -> &'static str {
    user_message(err.code())
}
