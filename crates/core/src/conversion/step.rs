//! A single cancellable unit of conversion work.
//!
//! A [`Step`] wraps a [`StepExecutor`] with a label, a monotonic state and
//! three append-only output sinks. Executor failures of any kind (error
//! returns, nonzero exit codes, panics) are captured into the step's
//! terminal state and never propagate to the caller.

use super::error::{describe_error, StepError};
use crate::events::EventSink;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lc_protocol::ipc::Event;
use lc_protocol::step_models::{OutputLine, OutputStream, StepOutcome, StepState};
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// Notice written to stdout when a step is skipped.
pub const SKIPPED_NOTICE: &str = "Skipped step";

/// The work performed by a step.
///
/// Implementations write progress to `output` and return the exit code of
/// the work they did. They should observe `cancel` at their await points
/// and return [`StepError::Cancelled`] once it fires.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(
        &self,
        output: &StepOutputSink,
        cancel: &CancellationToken,
    ) -> Result<i32, StepError>;
}

/// Where a step reports its output when it belongs to a pipeline.
#[derive(Clone, Debug)]
struct StepBinding {
    pipeline_id: Uuid,
    index: usize,
    events: EventSink,
}

/// Append-only command/stdout/stderr sinks handed to an executor.
///
/// Every line is buffered on the owning step and, when the step belongs to
/// a pipeline, emitted as an [`Event::StepOutput`].
#[derive(Clone, Debug)]
pub struct StepOutputSink {
    lines: Arc<Mutex<Vec<OutputLine>>>,
    binding: Option<StepBinding>,
}

impl StepOutputSink {
    pub fn command(&self, line: impl Into<String>) {
        self.push(OutputStream::Command, line.into());
    }

    pub fn stdout(&self, line: impl Into<String>) {
        self.push(OutputStream::Stdout, line.into());
    }

    pub fn stderr(&self, line: impl Into<String>) {
        self.push(OutputStream::Stderr, line.into());
    }

    fn push(&self, stream: OutputStream, content: String) {
        if let Some(binding) = &self.binding {
            binding.events.emit(Event::StepOutput {
                pipeline_id: binding.pipeline_id,
                step_index: binding.index,
                stream,
                content: content.clone(),
            });
        }

        let line = OutputLine { stream, content };
        match self.lines.lock() {
            Ok(mut lines) => lines.push(line),
            Err(poisoned) => poisoned.into_inner().push(line),
        }
    }
}

/// One labelled unit of work in a conversion pipeline.
pub struct Step {
    label: String,
    executor: Arc<dyn StepExecutor>,
    state: StepState,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    output: Arc<Mutex<Vec<OutputLine>>>,
    binding: Option<StepBinding>,
}

impl Step {
    /// Create a step in the NotStarted state.
    pub fn new(label: impl Into<String>, executor: impl StepExecutor + 'static) -> Self {
        Self::with_executor(label, Arc::new(executor))
    }

    /// Create a step around a shared executor.
    pub fn with_executor(label: impl Into<String>, executor: Arc<dyn StepExecutor>) -> Self {
        Self {
            label: label.into(),
            executor,
            state: StepState::NotStarted,
            started_at: None,
            finished_at: None,
            output: Arc::new(Mutex::new(Vec::new())),
            binding: None,
        }
    }

    /// Attach the step to a pipeline so its changes are emitted as events.
    pub(crate) fn bind(&mut self, pipeline_id: Uuid, index: usize, events: EventSink) {
        self.binding = Some(StepBinding {
            pipeline_id,
            index,
            events,
        });
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn state(&self) -> &StepState {
        &self.state
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Snapshot of everything the step has written so far.
    pub fn output(&self) -> Vec<OutputLine> {
        match self.output.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Run the executor to completion.
    ///
    /// Does nothing unless the step is NotStarted. On return the step is
    /// always `Finished`, whatever the executor did.
    pub async fn run(&mut self, cancel: &CancellationToken) {
        if self.state != StepState::NotStarted {
            debug!(step = %self.label, state = ?self.state, "Ignoring run on started step");
            return;
        }

        self.started_at = Some(Utc::now());
        self.transition(StepState::Running);

        let sink = self.output_sink();
        let executor = Arc::clone(&self.executor);
        let task_sink = sink.clone();
        let token = cancel.clone();
        let joined =
            tokio::spawn(async move { executor.execute(&task_sink, &token).await }).await;

        let result = match joined {
            Ok(result) => result,
            Err(join_error) if join_error.is_panic() => {
                Err(StepError::Panicked(panic_message(join_error.into_panic())))
            }
            Err(_) => Err(StepError::Cancelled),
        };

        let outcome = match result {
            Ok(exit_code) => StepOutcome::from_exit_code(exit_code),
            Err(err) => {
                let message = describe_error(&err);
                warn!(step = %self.label, error = %message, "Step handler failed");
                sink.stderr(message.clone());
                StepOutcome::HandlerError { message }
            }
        };

        self.finished_at = Some(Utc::now());
        self.transition(StepState::Finished(outcome));
    }

    /// Mark the step as skipped without running it.
    ///
    /// Does nothing unless the step is NotStarted.
    pub fn skip(&mut self) {
        if self.state != StepState::NotStarted {
            debug!(step = %self.label, state = ?self.state, "Ignoring skip on started step");
            return;
        }

        self.output_sink().stdout(SKIPPED_NOTICE);
        self.transition(StepState::Skipped);
    }

    fn output_sink(&self) -> StepOutputSink {
        StepOutputSink {
            lines: Arc::clone(&self.output),
            binding: self.binding.clone(),
        }
    }

    fn transition(&mut self, state: StepState) {
        debug!(step = %self.label, from = ?self.state, to = ?state, "Step state change");
        self.state = state;

        if let Some(binding) = &self.binding {
            binding.events.emit(Event::StepStateChanged {
                pipeline_id: binding.pipeline_id,
                step_index: binding.index,
                state: self.state.clone(),
            });
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("label", &self.label)
            .field("state", &self.state)
            .field("started_at", &self.started_at)
            .field("finished_at", &self.finished_at)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::executor::FnExecutor;

    fn exit_with(code: i32) -> FnExecutor {
        FnExecutor::new(move |output, _cancel| async move {
            output.stdout(format!("exiting with {code}"));
            Ok(code)
        })
    }

    #[tokio::test]
    async fn test_step_success() {
        let mut step = Step::new("convert", exit_with(0));
        assert_eq!(step.state(), &StepState::NotStarted);

        step.run(&CancellationToken::new()).await;

        assert_eq!(
            step.state(),
            &StepState::Finished(StepOutcome::Success { exit_code: 0 })
        );
        assert!(step.started_at().is_some());
        assert!(step.finished_at() >= step.started_at());
        assert_eq!(step.output()[0].content, "exiting with 0");
    }

    #[tokio::test]
    async fn test_step_nonzero_exit_is_failure() {
        let mut step = Step::new("quantize", exit_with(3));
        step.run(&CancellationToken::new()).await;

        assert_eq!(
            step.state(),
            &StepState::Finished(StepOutcome::Failure { exit_code: 3 })
        );
    }

    #[tokio::test]
    async fn test_handler_error_is_routed_to_stderr() {
        let executor = FnExecutor::new(|_output, _cancel| async move {
            Err(StepError::Spawn {
                command: "python3".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not installed"),
            })
        });
        let mut step = Step::new("check", executor);
        step.run(&CancellationToken::new()).await;

        let expected = "Failed to spawn command 'python3': not installed".to_string();
        assert_eq!(
            step.state(),
            &StepState::Finished(StepOutcome::HandlerError {
                message: expected.clone()
            })
        );

        let output = step.output();
        let last = output.last().unwrap();
        assert_eq!(last.stream, OutputStream::Stderr);
        assert_eq!(last.content, expected);
    }

    #[tokio::test]
    async fn test_panicking_handler_still_finishes() {
        let executor = FnExecutor::new(|_output, _cancel| async move {
            if true {
                panic!("converter exploded");
            }
            Ok(0)
        });
        let mut step = Step::new("explode", executor);
        step.run(&CancellationToken::new()).await;

        match step.state() {
            StepState::Finished(StepOutcome::HandlerError { message }) => {
                assert!(message.contains("converter exploded"));
            }
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_terminal_states_are_monotonic() {
        let mut step = Step::new("once", exit_with(1));
        step.run(&CancellationToken::new()).await;
        let finished = step.state().clone();
        let lines = step.output().len();

        step.run(&CancellationToken::new()).await;
        step.skip();

        assert_eq!(step.state(), &finished);
        assert_eq!(step.output().len(), lines);

        let mut skipped = Step::new("never", exit_with(0));
        skipped.skip();
        skipped.run(&CancellationToken::new()).await;
        assert_eq!(skipped.state(), &StepState::Skipped);
        assert!(skipped.started_at().is_none());
    }

    #[tokio::test]
    async fn test_skip_writes_notice() {
        let mut step = Step::new("cleanup", exit_with(0));
        step.skip();

        assert_eq!(step.state(), &StepState::Skipped);
        assert_eq!(
            step.output(),
            vec![OutputLine {
                stream: OutputStream::Stdout,
                content: SKIPPED_NOTICE.to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_bound_step_emits_events_in_order() {
        let (events, mut rx) = EventSink::channel();
        let pipeline_id = Uuid::new_v4();
        let mut step = Step::new("convert", exit_with(0));
        step.bind(pipeline_id, 4, events);

        step.run(&CancellationToken::new()).await;

        let mut received = Vec::new();
        while let Ok(event) = rx.try_recv() {
            received.push(event);
        }

        assert_eq!(received.len(), 3);
        assert!(matches!(
            &received[0],
            Event::StepStateChanged { step_index: 4, state: StepState::Running, .. }
        ));
        assert!(matches!(
            &received[1],
            Event::StepOutput { stream: OutputStream::Stdout, content, .. } if content == "exiting with 0"
        ));
        assert!(matches!(
            &received[2],
            Event::StepStateChanged { state: StepState::Finished(_), .. }
        ));
    }
}
