//! Mock step executors for deterministic testing.

use async_trait::async_trait;
use lc_core::conversion::{StepError, StepExecutor, StepOutputSink};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Counts how many executors run at once and how many ran in total.
#[derive(Debug, Default, Clone)]
#[allow(dead_code)]
pub struct ConcurrencyProbe {
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
    runs: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl ConcurrencyProbe {
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

/// An executor that waits, writes a line and exits with a fixed code.
#[allow(dead_code)]
pub struct ScriptedExecutor {
    pub name: String,
    pub exit_code: i32,
    pub delay: Duration,
    pub probe: ConcurrencyProbe,
}

impl ScriptedExecutor {
    #[allow(dead_code)]
    pub fn new(name: &str, exit_code: i32, probe: &ConcurrencyProbe) -> Self {
        Self {
            name: name.to_string(),
            exit_code,
            delay: Duration::from_millis(10),
            probe: probe.clone(),
        }
    }
}

#[async_trait]
impl StepExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        output: &StepOutputSink,
        cancel: &CancellationToken,
    ) -> Result<i32, StepError> {
        let active = self.probe.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.max_active.fetch_max(active, Ordering::SeqCst);
        self.probe.runs.fetch_add(1, Ordering::SeqCst);

        output.command(format!("{} --run", self.name));
        let result = tokio::select! {
            _ = cancel.cancelled() => Err(StepError::Cancelled),
            _ = tokio::time::sleep(self.delay) => {
                output.stdout(format!("{} exited with {}", self.name, self.exit_code));
                Ok(self.exit_code)
            }
        };

        self.probe.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// An executor that fails with a handler error.
#[allow(dead_code)]
pub struct FailingExecutor {
    pub message: String,
}

#[async_trait]
impl StepExecutor for FailingExecutor {
    async fn execute(
        &self,
        _output: &StepOutputSink,
        _cancel: &CancellationToken,
    ) -> Result<i32, StepError> {
        Err(StepError::failed(self.message.clone()))
    }
}
