//! Conversion pipeline models.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Lifecycle status of a conversion pipeline.
///
/// The status progresses NotRunning -> Running -> Finished. A restart
/// rebuilds every step and returns the pipeline to NotRunning first.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum PipelineState {
    /// The pipeline has been built but not started.
    #[default]
    NotRunning,

    /// A step is executing.
    Running,

    /// Every step has finished or been skipped.
    ///
    /// `success` is true only when all steps finished successfully.
    Finished { success: bool },
}

impl PipelineState {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished { .. })
    }
}
