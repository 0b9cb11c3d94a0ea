//! Configuration file loader.
//!
//! - `<root>/.llamachat/config.toml`: global settings (conversion tools)
//! - chat sources: a [`VersionedPayload`] of [`ChatSourceSettings`] in JSON

use crate::config::error::ConfigError;
use crate::config::error::ConfigResult;
use crate::config::models::AppConfig;
use lc_protocol::settings_models::{ChatSourceSettings, VersionedPayload};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory holding the global configuration, relative to the root.
pub const CONFIG_DIR_NAME: &str = ".llamachat";

/// Newest chat-sources payload version this build can read.
pub const CURRENT_PAYLOAD_VERSION: u32 = 1;

/// Loads the global configuration from `<root>/.llamachat/config.toml`.
///
/// # Arguments
///
/// * `root` - Root directory containing the `.llamachat/` folder
///
/// # Returns
///
/// The parsed configuration, or the defaults when the directory or file is
/// missing. Relative script and binary paths are resolved against `root`;
/// a bare interpreter name is left for PATH lookup.
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read, is not
/// valid TOML, or names an empty quantization type.
///
/// # Example
///
/// ```rust,no_run
/// use lc_core::config::loader::load_config;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new(".")).await?;
/// println!("Quantizing to {}", config.conversion.quantization);
/// # Ok(())
/// # }
/// ```
pub async fn load_config(root: &Path) -> ConfigResult<AppConfig> {
    let config_path = root.join(CONFIG_DIR_NAME).join("config.toml");

    if !config_path.exists() {
        debug!(path = %config_path.display(), "No config file, using defaults");
        return Ok(AppConfig::default());
    }

    let content = tokio::fs::read_to_string(&config_path)
        .await
        .map_err(|source| ConfigError::FileRead {
            path: config_path.clone(),
            source,
        })?;

    let mut config: AppConfig =
        toml::from_str(&content).map_err(|source| ConfigError::TomlParse {
            path: config_path.clone(),
            source,
        })?;

    if config.conversion.quantization.trim().is_empty() {
        return Err(ConfigError::InvalidConfig {
            path: config_path,
            reason: "conversion.quantization must not be empty".to_string(),
        });
    }

    let tools = &mut config.conversion;
    tools.python = resolve_tool_path(root, &tools.python);
    tools.quantize = resolve_tool_path(root, &tools.quantize);
    if tools.convert_script.is_relative() {
        tools.convert_script = root.join(&tools.convert_script);
    }

    Ok(config)
}

/// Resolve `path` against `root` unless it is absolute or a bare name.
fn resolve_tool_path(root: &Path, path: &Path) -> PathBuf {
    if path.is_relative() && path.components().count() > 1 {
        root.join(path)
    } else {
        path.to_path_buf()
    }
}

/// Loads the persisted chat sources.
///
/// A missing file means no sources have been configured yet.
///
/// # Errors
///
/// Returns `ConfigError::UnsupportedPayloadVersion` for payloads written by
/// a newer version, and read/parse errors otherwise.
pub async fn load_chat_sources(path: &Path) -> ConfigResult<Vec<ChatSourceSettings>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;

    let payload: VersionedPayload<Vec<ChatSourceSettings>> =
        serde_json::from_str(&content).map_err(|source| ConfigError::JsonParse {
            path: path.to_path_buf(),
            source,
        })?;

    if payload.payload_version > CURRENT_PAYLOAD_VERSION {
        return Err(ConfigError::UnsupportedPayloadVersion {
            path: path.to_path_buf(),
            found: payload.payload_version,
            supported: CURRENT_PAYLOAD_VERSION,
        });
    }

    debug!(
        path = %path.display(),
        count = payload.value.len(),
        written_by = %payload.serializing_app_short_version_string,
        "Loaded chat sources"
    );
    Ok(payload.value)
}

/// Writes the chat sources as a current-version payload.
///
/// # Errors
///
/// Returns `ConfigError::FileWrite` if the directory or file cannot be
/// written.
pub async fn save_chat_sources(path: &Path, sources: &[ChatSourceSettings]) -> ConfigResult<()> {
    let payload = VersionedPayload {
        value: sources.to_vec(),
        payload_version: CURRENT_PAYLOAD_VERSION,
        serializing_app_version: 1,
        serializing_app_short_version_string: env!("CARGO_PKG_VERSION").to_string(),
    };

    let json = serde_json::to_string_pretty(&payload).map_err(|source| ConfigError::JsonSerialize {
        path: path.to_path_buf(),
        source,
    })?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| ConfigError::FileWrite {
                path: parent.to_path_buf(),
                source,
            })?;
    }

    tokio::fs::write(path, json)
        .await
        .map_err(|source| ConfigError::FileWrite {
            path: path.to_path_buf(),
            source,
        })
}
