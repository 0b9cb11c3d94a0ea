//! Registry of conversion pipelines running in the background.
//!
//! The ConversionManager owns every in-flight pipeline. Each one runs on its
//! own tokio task; the manager keeps the task handle and a stop handle so a
//! pipeline can be stopped, awaited, or restarted by id.

use super::error::PipelineError;
use super::pipeline::{Pipeline, StopHandle};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

struct RunningPipeline {
    stop: StopHandle,
    task: JoinHandle<Pipeline>,
}

/// Manages all conversion pipelines.
#[derive(Default, Clone)]
pub struct ConversionManager {
    /// Registry of pipelines, indexed by pipeline id.
    pipelines: Arc<Mutex<HashMap<Uuid, RunningPipeline>>>,
}

impl ConversionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start running a pipeline in the background.
    ///
    /// # Returns
    ///
    /// The id of the pipeline, usable with [`stop`](Self::stop) and
    /// [`wait`](Self::wait). The pipeline stays registered after it
    /// finishes until it is taken out by [`wait`](Self::wait) or
    /// [`take_finished`](Self::take_finished).
    pub async fn start(&self, pipeline: Pipeline) -> Uuid {
        let id = pipeline.id();
        let stop = pipeline.stop_handle();
        let task = tokio::spawn(drive(pipeline));

        self.pipelines
            .lock()
            .await
            .insert(id, RunningPipeline { stop, task });
        id
    }

    /// Request a cooperative stop of a pipeline.
    ///
    /// Stopping a pipeline that already finished is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotFound`] if no pipeline has the id.
    pub async fn stop(&self, id: Uuid) -> Result<(), PipelineError> {
        let pipelines = self.pipelines.lock().await;
        let running = pipelines.get(&id).ok_or(PipelineError::NotFound(id))?;
        debug!(pipeline = %id, "Stopping pipeline");
        running.stop.stop();
        Ok(())
    }

    /// Stop every registered pipeline.
    pub async fn stop_all(&self) {
        for running in self.pipelines.lock().await.values() {
            running.stop.stop();
        }
    }

    /// Wait for a pipeline to finish and take it out of the registry.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotFound`] if no pipeline has the id, and
    /// [`PipelineError::TaskFailed`] if its task was aborted.
    pub async fn wait(&self, id: Uuid) -> Result<Pipeline, PipelineError> {
        let running = self
            .pipelines
            .lock()
            .await
            .remove(&id)
            .ok_or(PipelineError::NotFound(id))?;

        running
            .task
            .await
            .map_err(|e| PipelineError::TaskFailed(e.to_string()))
    }

    /// Restart a finished pipeline from scratch with fresh steps.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::AlreadyRunning`] while the pipeline's task
    /// is still running, and the errors of [`wait`](Self::wait).
    pub async fn restart(&self, id: Uuid) -> Result<(), PipelineError> {
        {
            let pipelines = self.pipelines.lock().await;
            let running = pipelines.get(&id).ok_or(PipelineError::NotFound(id))?;
            if !running.task.is_finished() {
                return Err(PipelineError::AlreadyRunning);
            }
        }

        let mut pipeline = self.wait(id).await?;
        pipeline.reset()?;
        let stop = pipeline.stop_handle();
        let task = tokio::spawn(drive(pipeline));

        self.pipelines
            .lock()
            .await
            .insert(id, RunningPipeline { stop, task });
        Ok(())
    }

    /// Take every finished pipeline out of the registry.
    ///
    /// Pipelines whose task was aborted are logged and dropped.
    pub async fn take_finished(&self) -> Vec<Pipeline> {
        let finished: Vec<(Uuid, RunningPipeline)> = {
            let mut pipelines = self.pipelines.lock().await;
            let ids: Vec<Uuid> = pipelines
                .iter()
                .filter(|(_, running)| running.task.is_finished())
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| pipelines.remove(&id).map(|running| (id, running)))
                .collect()
        };

        let mut done = Vec::with_capacity(finished.len());
        for (id, running) in finished {
            match running.task.await {
                Ok(pipeline) => done.push(pipeline),
                Err(e) => warn!(pipeline = %id, error = %e, "Pipeline task failed"),
            }
        }
        done
    }

    /// Ids of all registered pipelines, finished or not.
    pub async fn ids(&self) -> Vec<Uuid> {
        self.pipelines.lock().await.keys().copied().collect()
    }

    /// Whether the pipeline's task is still running.
    pub async fn is_running(&self, id: Uuid) -> bool {
        self.pipelines
            .lock()
            .await
            .get(&id)
            .is_some_and(|running| !running.task.is_finished())
    }
}

async fn drive(mut pipeline: Pipeline) -> Pipeline {
    if let Err(e) = pipeline.run().await {
        warn!(pipeline = %pipeline.id(), error = %e, "Pipeline did not run");
    }
    pipeline
}
