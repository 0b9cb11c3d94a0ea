//! Configuration models.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application configuration loaded from `.llamachat/config.toml`.
///
/// ```toml
/// [conversion]
/// python = "/usr/local/bin/python3"
/// convert_script = "vendor/llama.cpp/convert-pth-to-ggml.py"
/// quantize = "vendor/llama.cpp/quantize"
/// quantization = "q4_0"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub conversion: ConversionTools,
}

/// Locations of the external tools used by the conversion recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionTools {
    /// Python interpreter, resolved on PATH when not absolute.
    pub python: PathBuf,

    /// llama.cpp `convert-pth-to-ggml.py`.
    pub convert_script: PathBuf,

    /// llama.cpp `quantize` binary.
    pub quantize: PathBuf,

    /// Quantization type passed to `quantize`.
    pub quantization: String,
}

impl Default for ConversionTools {
    fn default() -> Self {
        Self {
            python: PathBuf::from("python3"),
            convert_script: PathBuf::from("convert-pth-to-ggml.py"),
            quantize: PathBuf::from("quantize"),
            quantization: "q4_0".to_string(),
        }
    }
}
