//! The PyTorch checkpoint to quantized model conversion recipe.
//!
//! The recipe is a fixed sequence of steps:
//!
//! 1. Checking environment: the python interpreter and tools are present
//! 2. Checking dependencies: numpy, sentencepiece and torch import cleanly
//! 3. Converting to f16: `convert-pth-to-ggml.py <source> 1`
//! 4. Quantizing: `quantize <f16> <output> <type>`
//! 5. Cleaning up: the f16 intermediate is removed

use super::error::{SourceError, StepError};
use super::executor::{CommandExecutor, FnExecutor};
use super::pipeline::Pipeline;
use super::step::{Step, StepExecutor};
use crate::config::models::ConversionTools;
use crate::events::EventSink;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Name of the f16 file the convert script writes into the source directory.
pub const INTERMEDIATE_FILE_NAME: &str = "ggml-model-f16.bin";

const PARAMS_FILE_NAME: &str = "params.json";
const TOKENIZER_FILE_NAME: &str = "tokenizer.model";

/// A validated PyTorch-format model directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSource {
    pub directory: PathBuf,
    pub params_path: PathBuf,
    pub tokenizer_path: PathBuf,

    /// `consolidated.NN.pth` shards, sorted by name.
    pub checkpoint_shards: Vec<PathBuf>,
}

impl ModelSource {
    /// Validate a model directory.
    ///
    /// The directory must contain `params.json` and at least one
    /// `consolidated.NN.pth` shard. `tokenizer.model` may live in the
    /// directory itself or in its parent, which is how the original LLaMA
    /// weights are distributed.
    ///
    /// # Errors
    ///
    /// Returns `SourceError` describing the first missing piece.
    pub fn from_directory(directory: &Path) -> Result<Self, SourceError> {
        if !directory.is_dir() {
            return Err(SourceError::NotADirectory(directory.to_path_buf()));
        }

        let params_path = directory.join(PARAMS_FILE_NAME);
        if !params_path.is_file() {
            return Err(SourceError::MissingFile {
                path: directory.to_path_buf(),
                file: PARAMS_FILE_NAME.to_string(),
            });
        }

        let tokenizer_path = std::iter::once(directory)
            .chain(directory.parent())
            .map(|dir| dir.join(TOKENIZER_FILE_NAME))
            .find(|path| path.is_file())
            .ok_or_else(|| SourceError::MissingFile {
                path: directory.to_path_buf(),
                file: TOKENIZER_FILE_NAME.to_string(),
            })?;

        let mut checkpoint_shards = Vec::new();
        for entry in WalkDir::new(directory).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|source| SourceError::DirectoryWalk {
                path: directory.to_path_buf(),
                source,
            })?;

            let is_shard = entry
                .file_name()
                .to_str()
                .is_some_and(is_checkpoint_shard_name);
            if is_shard && entry.file_type().is_file() {
                checkpoint_shards.push(entry.into_path());
            }
        }

        if checkpoint_shards.is_empty() {
            return Err(SourceError::NoCheckpointShards(directory.to_path_buf()));
        }
        checkpoint_shards.sort();

        Ok(Self {
            directory: directory.to_path_buf(),
            params_path,
            tokenizer_path,
            checkpoint_shards,
        })
    }
}

/// Match `consolidated.NN.pth`.
fn is_checkpoint_shard_name(name: &str) -> bool {
    name.strip_prefix("consolidated.")
        .and_then(|rest| rest.strip_suffix(".pth"))
        .is_some_and(|digits| digits.len() == 2 && digits.chars().all(|c| c.is_ascii_digit()))
}

/// Builds the conversion steps for one model source.
#[derive(Debug, Clone)]
pub struct ConversionRecipe {
    source: ModelSource,
    output_dir: PathBuf,
    tools: ConversionTools,
}

impl ConversionRecipe {
    /// # Arguments
    ///
    /// * `source` - The validated PyTorch model directory
    /// * `output_dir` - Where the quantized model is written
    /// * `tools` - Locations of the interpreter, convert script and quantizer
    pub fn new(source: ModelSource, output_dir: impl Into<PathBuf>, tools: ConversionTools) -> Self {
        Self {
            source,
            output_dir: output_dir.into(),
            tools,
        }
    }

    pub fn source(&self) -> &ModelSource {
        &self.source
    }

    /// The f16 file produced by the convert step.
    pub fn intermediate_path(&self) -> PathBuf {
        self.source.directory.join(INTERMEDIATE_FILE_NAME)
    }

    /// The quantized model produced by the recipe.
    pub fn output_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("ggml-model-{}.bin", self.tools.quantization))
    }

    /// A fresh, unstarted step sequence.
    pub fn steps(&self) -> Vec<Step> {
        vec![
            Step::new("Checking environment", self.check_environment()),
            Step::new("Checking dependencies", self.check_dependencies()),
            Step::new("Converting to f16", self.convert_to_f16()),
            Step::new("Quantizing", self.quantize()),
            Step::new("Cleaning up", self.clean_up()),
        ]
    }

    /// Build a pipeline that runs this recipe.
    pub fn into_pipeline(self, events: EventSink) -> Pipeline {
        Pipeline::new(move || self.steps(), events)
    }

    fn check_environment(&self) -> FnExecutor {
        let tools = self.tools.clone();
        FnExecutor::new(move |output, cancel| {
            let tools = tools.clone();
            async move {
                for tool in [&tools.python, &tools.quantize] {
                    let found = which::which(tool).map_err(|source| StepError::ToolNotFound {
                        tool: tool.display().to_string(),
                        source,
                    })?;
                    output.stdout(format!("Found {} at {}", tool.display(), found.display()));
                }

                if !tools.convert_script.is_file() {
                    return Err(StepError::failed(format!(
                        "Convert script not found at {}",
                        tools.convert_script.display()
                    )));
                }
                output.stdout(format!(
                    "Found convert script at {}",
                    tools.convert_script.display()
                ));

                CommandExecutor::new(&tools.python)
                    .arg("--version")
                    .execute(&output, &cancel)
                    .await
            }
        })
    }

    fn check_dependencies(&self) -> CommandExecutor {
        CommandExecutor::new(&self.tools.python)
            .arg("-c")
            .arg("import numpy; import sentencepiece; import torch; print('Dependencies OK')")
    }

    fn convert_to_f16(&self) -> CommandExecutor {
        CommandExecutor::new(&self.tools.python)
            .arg(&self.tools.convert_script)
            .arg(&self.source.directory)
            .arg("1")
    }

    fn quantize(&self) -> FnExecutor {
        let quantize = CommandExecutor::new(&self.tools.quantize)
            .arg(self.intermediate_path())
            .arg(self.output_path())
            .arg(&self.tools.quantization);
        let output_dir = self.output_dir.clone();
        FnExecutor::new(move |output, cancel| {
            let quantize = quantize.clone();
            let output_dir = output_dir.clone();
            async move {
                tokio::fs::create_dir_all(&output_dir).await?;
                quantize.execute(&output, &cancel).await
            }
        })
    }

    fn clean_up(&self) -> FnExecutor {
        let intermediate = self.intermediate_path();
        FnExecutor::new(move |output, _cancel| {
            let intermediate = intermediate.clone();
            async move {
                output.command(format!("rm {}", intermediate.display()));
                match tokio::fs::remove_file(&intermediate).await {
                    Ok(()) => output.stdout(format!("Removed {}", intermediate.display())),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        output.stdout("Nothing to clean up");
                    }
                    Err(e) => return Err(StepError::Io(e)),
                }
                Ok(0)
            }
        })
    }
}
