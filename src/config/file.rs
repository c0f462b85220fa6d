//! TOML configuration file loading
//!
//! Supports `~/.config/omni/beacon-vad/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct VadConfigFile {
    /// Controller and detector options, keyed by option name
    ///
    /// Kept as a raw table so unrecognized keys can be dropped individually.
    #[serde(default)]
    pub vad: toml::Table,

    /// Speech segment recording
    #[serde(default)]
    pub recording: RecordingFileConfig,
}

/// Speech segment recording configuration
#[derive(Debug, Default, Deserialize)]
pub struct RecordingFileConfig {
    /// Directory to write speech segments to as WAV files
    pub save_dir: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `VadConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> VadConfigFile {
    config_file_path().map_or_else(VadConfigFile::default, |path| load_config_file_from(&path))
}

/// Load a TOML config file from `path`
///
/// Returns `VadConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file_from(path: &Path) -> VadConfigFile {
    if !path.exists() {
        return VadConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                VadConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            VadConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/omni/beacon-vad/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| {
        d.config_dir()
            .join("omni")
            .join("beacon-vad")
            .join("config.toml")
    })
}
