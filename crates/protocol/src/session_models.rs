//! Inference session models.
//!
//! This module defines the model identity, the user-configured generation
//! parameters, and the state machine of a loaded model.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use ts_rs::TS;

/// Family of the model file, which selects the inference engine.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, TS)]
#[serde(rename_all = "camelCase")]
pub enum ModelKind {
    /// LLaMA-family models (LLaMA, Alpaca, GPT4All).
    Llama,
    /// GPT-J family models.
    Gptj,
}

impl ModelKind {
    /// Human-readable name of the model family.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Llama => "LLaMA",
            Self::Gptj => "GPT-J",
        }
    }
}

/// The model file a session is backed by.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct ModelIdentity {
    pub path: PathBuf,
    pub kind: ModelKind,
}

/// Generation parameters as configured by the user.
///
/// These are the raw values read from settings. The core derives the
/// effective values it hands to the backend from them, applying floors and
/// machine-dependent defaults.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct ModelParameters {
    /// Size of the context window in tokens.
    pub context_size: u32,

    /// Maximum number of tokens generated per reply.
    pub num_tokens: u32,

    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,

    /// Number of prompt tokens evaluated per batch.
    pub batch_size: u32,

    pub repeat_penalty: f32,

    /// Number of trailing tokens the repeat penalty applies to.
    pub last_n_tokens: u32,

    /// Sampling seed. `None` picks a random seed per session.
    #[serde(default)]
    pub seed: Option<u32>,

    /// Thread count override. `None` uses the machine default.
    #[serde(default)]
    pub thread_count: Option<usize>,
}

impl ModelParameters {
    /// Default parameters for a model family.
    pub fn defaults_for(kind: ModelKind) -> Self {
        match kind {
            ModelKind::Llama => Self {
                context_size: 2048,
                num_tokens: 512,
                temperature: 0.8,
                top_k: 40,
                top_p: 0.95,
                batch_size: 8,
                repeat_penalty: 1.1,
                last_n_tokens: 64,
                seed: None,
                thread_count: None,
            },
            ModelKind::Gptj => Self {
                context_size: 2048,
                num_tokens: 200,
                temperature: 0.9,
                top_k: 40,
                top_p: 0.9,
                batch_size: 8,
                repeat_penalty: 1.0,
                last_n_tokens: 64,
                seed: None,
                thread_count: None,
            },
        }
    }
}

/// Lifecycle status of an inference session.
///
/// NotStarted -> LoadingModel -> ReadyToPredict <-> Predicting.
/// A failed model load moves the session to Error, which is terminal for
/// that session instance.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum SessionState {
    #[default]
    NotStarted,
    LoadingModel,
    ReadyToPredict,
    Predicting,
    Error { reason: String },
}

impl SessionState {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// The backend's accumulated context, exposed for debugging display.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default, TS)]
pub struct ContextSnapshot {
    /// Token ids currently held in the context window.
    pub tokens: Vec<i32>,

    /// The context rendered back to text.
    pub rendered: String,
}
