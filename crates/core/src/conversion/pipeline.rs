//! Sequential, skip-on-failure runner of conversion steps.
//!
//! A [`Pipeline`] runs its steps strictly one after another. As soon as a
//! step finishes unsuccessfully or is skipped, every later step is skipped
//! and the pipeline finishes with `success = false`.

use super::error::PipelineError;
use super::step::Step;
use crate::events::EventSink;
use lc_protocol::ipc::Event;
use lc_protocol::pipeline_models::PipelineState;
use lc_protocol::step_models::StepState;
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Produces a fresh step sequence each time the pipeline is (re)built.
pub type StepBuilder = Box<dyn Fn() -> Vec<Step> + Send + Sync>;

/// Requests a cooperative stop of one pipeline run.
///
/// The handle belongs to the run it was taken from; a restarted pipeline
/// hands out new handles.
#[derive(Debug, Clone)]
pub struct StopHandle {
    token: CancellationToken,
}

impl StopHandle {
    /// Ask the running step to stop and skip every step after it.
    ///
    /// Safe to call any number of times, before, during or after the run.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// An ordered sequence of steps with a lifecycle of its own.
pub struct Pipeline {
    id: Uuid,
    builder: StepBuilder,
    steps: Vec<Step>,
    state: PipelineState,
    cancel: CancellationToken,
    events: EventSink,
}

impl Pipeline {
    /// Create a pipeline whose steps are produced by `builder`.
    ///
    /// # Arguments
    ///
    /// * `builder` - Called now and on every restart to produce the steps
    /// * `events` - Receives pipeline and step events
    pub fn new<F>(builder: F, events: EventSink) -> Self
    where
        F: Fn() -> Vec<Step> + Send + Sync + 'static,
    {
        let mut pipeline = Self {
            id: Uuid::new_v4(),
            builder: Box::new(builder),
            steps: Vec::new(),
            state: PipelineState::NotRunning,
            cancel: CancellationToken::new(),
            events,
        };
        pipeline.rebuild();
        pipeline
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Index of the step currently running, if any.
    pub fn running_step(&self) -> Option<usize> {
        self.steps
            .iter()
            .position(|step| *step.state() == StepState::Running)
    }

    /// Handle that stops the current (or next) run.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            token: self.cancel.clone(),
        }
    }

    /// Run every step in order.
    ///
    /// Returns whether all steps finished successfully.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline is not in the NotRunning state or
    /// has no steps. Step failures are not errors: they finish the pipeline
    /// with `success = false`.
    pub async fn run(&mut self) -> Result<bool, PipelineError> {
        if self.state != PipelineState::NotRunning {
            return Err(PipelineError::InvalidState(self.state));
        }
        if self.steps.is_empty() {
            return Err(PipelineError::NoSteps);
        }

        info!(pipeline = %self.id, steps = self.steps.len(), "Starting pipeline");
        self.set_state(PipelineState::Running);

        let mut index = 0;
        let success = loop {
            if self.cancel.is_cancelled() {
                self.steps[index].skip();
            } else {
                let cancel = self.cancel.clone();
                self.steps[index].run(&cancel).await;
            }

            match self.steps[index].state() {
                StepState::Finished(outcome) if outcome.is_success() => {
                    if index + 1 < self.steps.len() {
                        index += 1;
                    } else {
                        break true;
                    }
                }
                StepState::Finished(outcome) => {
                    warn!(
                        pipeline = %self.id,
                        step = %self.steps[index].label(),
                        outcome = ?outcome,
                        "Step failed, skipping remaining steps"
                    );
                    self.skip_from(index + 1);
                    break false;
                }
                StepState::Skipped => {
                    debug!(pipeline = %self.id, index, "Step skipped, skipping remaining steps");
                    self.skip_from(index + 1);
                    break false;
                }
                StepState::NotStarted | StepState::Running => {
                    warn!(pipeline = %self.id, index, "Step did not reach a terminal state");
                    self.skip_from(index + 1);
                    break false;
                }
            }
        };

        info!(pipeline = %self.id, success, "Pipeline finished");
        self.set_state(PipelineState::Finished { success });
        Ok(success)
    }

    /// Discard all step state, rebuild the steps and run again.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::AlreadyRunning`] while a run is in flight,
    /// and any error [`Pipeline::run`] returns.
    pub async fn restart(&mut self) -> Result<bool, PipelineError> {
        self.reset()?;
        self.run().await
    }

    /// Discard all step state and rebuild the steps without running them.
    ///
    /// Stop handles taken before the reset no longer affect the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::AlreadyRunning`] while a run is in flight.
    pub fn reset(&mut self) -> Result<(), PipelineError> {
        if self.state == PipelineState::Running {
            return Err(PipelineError::AlreadyRunning);
        }

        debug!(pipeline = %self.id, "Resetting pipeline");
        self.cancel = CancellationToken::new();
        self.rebuild();
        self.set_state(PipelineState::NotRunning);
        Ok(())
    }

    fn rebuild(&mut self) {
        self.steps = (self.builder)();
        for (index, step) in self.steps.iter_mut().enumerate() {
            step.bind(self.id, index, self.events.clone());
        }
    }

    fn skip_from(&mut self, index: usize) {
        for step in self.steps.iter_mut().skip(index) {
            step.skip();
        }
    }

    fn set_state(&mut self, state: PipelineState) {
        self.state = state;
        self.events.emit(Event::PipelineStateChanged {
            pipeline_id: self.id,
            state,
        });
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}
