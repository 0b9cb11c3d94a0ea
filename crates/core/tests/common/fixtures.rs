//! Test fixtures for model sources and conversion tools.

use lc_core::config::models::ConversionTools;
use lc_protocol::session_models::ModelKind;
use lc_protocol::settings_models::ChatSourceSettings;
use std::path::Path;
use tempfile::TempDir;

/// Create a temporary PyTorch-format model directory.
///
/// Layout: `<tmp>/tokenizer.model` and `<tmp>/7B/{params.json,
/// consolidated.00.pth}`. Returns the TempDir, which must be kept alive for
/// the test duration, and the model directory.
#[allow(dead_code)]
pub fn create_model_source() -> std::io::Result<(TempDir, std::path::PathBuf)> {
    let temp_dir = tempfile::tempdir()?;
    let model_dir = temp_dir.path().join("7B");
    std::fs::create_dir_all(&model_dir)?;

    std::fs::write(temp_dir.path().join("tokenizer.model"), b"tokenizer")?;
    std::fs::write(
        model_dir.join("params.json"),
        r#"{"dim": 4096, "multiple_of": 256, "n_heads": 32, "n_layers": 32, "norm_eps": 1e-06, "vocab_size": -1}"#,
    )?;
    std::fs::write(model_dir.join("consolidated.00.pth"), b"weights")?;

    Ok((temp_dir, model_dir))
}

/// Write an executable shell script.
#[cfg(unix)]
#[allow(dead_code)]
pub fn write_script(path: &Path, body: &str) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::write(path, format!("#!/bin/sh\n{body}\n"))?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

/// Install a fake python interpreter, convert script and quantizer in `dir`.
///
/// The fake interpreter answers `--version`, exits with
/// `dependency_exit_code` for `-c` imports, and otherwise writes the f16
/// intermediate into the source directory. The fake quantizer copies the
/// intermediate to the output path.
#[cfg(unix)]
#[allow(dead_code)]
pub fn create_fake_toolchain(dir: &Path, dependency_exit_code: i32) -> std::io::Result<ConversionTools> {
    let python = dir.join("python3");
    write_script(
        &python,
        &format!(
            r#"case "$1" in
  --version) echo "Python 3.11.4" ;;
  -c) echo "checking imports"; exit {dependency_exit_code} ;;
  *) echo "Converting $2"; printf 'f16' > "$2/ggml-model-f16.bin" ;;
esac"#
        ),
    )?;

    let convert_script = dir.join("convert-pth-to-ggml.py");
    std::fs::write(&convert_script, "# placeholder\n")?;

    let quantize = dir.join("quantize");
    write_script(&quantize, r#"cp "$1" "$2" && echo "quantized to $3""#)?;

    Ok(ConversionTools {
        python,
        convert_script,
        quantize,
        quantization: "q4_0".to_string(),
    })
}

/// Chat-source settings for a LLaMA model at a fake path.
#[allow(dead_code)]
pub fn llama_source(id: &str) -> ChatSourceSettings {
    ChatSourceSettings::new(
        id,
        format!("Test {id}"),
        ModelKind::Llama,
        format!("/models/{id}/ggml-model-q4_0.bin"),
    )
}
