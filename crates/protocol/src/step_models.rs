//! Conversion step models.
//!
//! A step is one unit of external work inside a conversion pipeline. These
//! types describe what a step has emitted and where it is in its lifecycle.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// The output sink a line was written to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, TS)]
#[serde(rename_all = "camelCase")]
pub enum OutputStream {
    /// Echo of the command being executed.
    Command,
    /// Standard output of the step.
    Stdout,
    /// Standard error of the step, including captured handler errors.
    Stderr,
}

/// A single line of step output.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub content: String,
}

/// How a finished step ended.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum StepOutcome {
    /// The handler returned exit code 0.
    Success { exit_code: i32 },

    /// The handler returned a nonzero exit code.
    Failure { exit_code: i32 },

    /// The handler itself failed before producing an exit code.
    ///
    /// `message` carries the error and every underlying cause.
    HandlerError { message: String },
}

impl StepOutcome {
    /// Build the outcome for a handler's exit code.
    pub fn from_exit_code(exit_code: i32) -> Self {
        if exit_code == 0 {
            Self::Success { exit_code }
        } else {
            Self::Failure { exit_code }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Lifecycle status of a step.
///
/// Transitions are monotonic:
/// NotStarted -> Running -> Finished, or NotStarted -> Skipped.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum StepState {
    /// The step has not been started or skipped yet.
    #[default]
    NotStarted,

    /// The step was skipped without running.
    Skipped,

    /// The step's handler is executing.
    Running,

    /// The step's handler has returned.
    Finished(StepOutcome),
}

impl StepState {
    /// Whether the state is `Skipped` or `Finished`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Skipped | Self::Finished(_))
    }
}
