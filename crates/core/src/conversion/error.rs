//! Error types for model conversion.

use lc_protocol::pipeline_models::PipelineState;
use std::error::Error as StdError;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by a step's executor.
///
/// These never escape a step: the step records them as a `HandlerError`
/// outcome, with the full cause chain rendered by [`describe_error`].
#[derive(Error, Debug)]
pub enum StepError {
    /// The external process could not be started.
    #[error("Failed to spawn command '{command}'")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// A required tool is not installed or not on PATH.
    #[error("Could not find '{tool}'")]
    ToolNotFound {
        tool: String,
        #[source]
        source: which::Error,
    },

    /// Reading process output or touching the filesystem failed.
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// The pipeline was stopped while the step was running.
    #[error("Cancelled")]
    Cancelled,

    /// The executor panicked.
    #[error("Step handler panicked: {0}")]
    Panicked(String),

    /// Any other executor failure.
    #[error("{message}")]
    Failed {
        message: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },
}

impl StepError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            source: None,
        }
    }
}

/// Errors from driving a pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The builder produced no steps.
    #[error("Pipeline has no steps")]
    NoSteps,

    /// `run` was called outside the NotRunning state.
    #[error("Pipeline cannot run from state {0:?}")]
    InvalidState(PipelineState),

    /// `restart` was called while the pipeline is running.
    #[error("Pipeline is already running")]
    AlreadyRunning,

    /// No pipeline is registered under the id.
    #[error("Pipeline {0} not found")]
    NotFound(Uuid),

    /// The background task driving the pipeline died.
    #[error("Pipeline task failed: {0}")]
    TaskFailed(String),
}

/// Errors from validating a PyTorch model source directory.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("Missing {file} in {path}")]
    MissingFile { path: PathBuf, file: String },

    #[error("No consolidated.*.pth checkpoint shards found in {0}")]
    NoCheckpointShards(PathBuf),

    #[error("Failed to traverse directory {path}")]
    DirectoryWalk {
        path: PathBuf,
        source: walkdir::Error,
    },
}

/// Render an error together with every underlying cause.
///
/// Causes are joined with `": "`, outermost first.
pub fn describe_error(err: &(dyn StdError + 'static)) -> String {
    let mut description = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        description.push_str(": ");
        description.push_str(&cause.to_string());
        source = cause.source();
    }
    description
}
