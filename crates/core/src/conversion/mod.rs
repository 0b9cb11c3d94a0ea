//! Model conversion: steps, pipelines, and the PyTorch to ggml recipe.

pub mod error;
pub mod executor;
pub mod manager;
pub mod pipeline;
pub mod recipe;
pub mod step;

pub use error::{PipelineError, SourceError, StepError};
pub use executor::{CommandExecutor, FnExecutor};
pub use manager::ConversionManager;
pub use pipeline::{Pipeline, StopHandle};
pub use recipe::{ConversionRecipe, ModelSource};
pub use step::{Step, StepExecutor, StepOutputSink};
