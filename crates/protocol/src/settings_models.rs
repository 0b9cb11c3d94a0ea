//! Persisted chat-source settings.
//!
//! Settings documents are wrapped in a [`VersionedPayload`] so that newer
//! app versions can detect payloads they do not understand.
//!
//! # Example
//!
//! ```json
//! {
//!   "value": [
//!     {
//!       "id": "alpaca-7b",
//!       "name": "Alpaca 7B",
//!       "modelKind": "llama",
//!       "modelPath": "/models/alpaca/ggml-model-q4_0.bin",
//!       "parameters": { "contextSize": 2048, "numTokens": 512, ... }
//!     }
//!   ],
//!   "payloadVersion": 1,
//!   "serializingAppVersion": 42,
//!   "serializingAppShortVersionString": "1.2.0"
//! }
//! ```

use crate::session_models::{ModelIdentity, ModelKind, ModelParameters};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use ts_rs::TS;

/// A settings value tagged with the version information of its writer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct VersionedPayload<T> {
    pub value: T,

    /// Schema version of `value`.
    pub payload_version: u32,

    /// Build number of the app that wrote the payload.
    pub serializing_app_version: u32,

    /// Marketing version of the app that wrote the payload.
    pub serializing_app_short_version_string: String,
}

/// A configured, named reference to a model file, its engine and parameters.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct ChatSourceSettings {
    /// Stable identifier of the chat source.
    pub id: String,

    /// Display name.
    pub name: String,

    pub model_kind: ModelKind,
    pub model_path: PathBuf,
    pub parameters: ModelParameters,
}

impl ChatSourceSettings {
    /// Create settings with the default parameters for `model_kind`.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        model_kind: ModelKind,
        model_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            model_kind,
            model_path: model_path.into(),
            parameters: ModelParameters::defaults_for(model_kind),
        }
    }

    pub fn model_identity(&self) -> ModelIdentity {
        ModelIdentity {
            path: self.model_path.clone(),
            kind: self.model_kind,
        }
    }
}
