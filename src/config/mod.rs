//! Configuration management for Beacon VAD
//!
//! Options are layered: defaults, then the TOML file, then environment
//! variables, then `key=value` pairs from the command line.

pub mod file;

use std::path::PathBuf;

use crate::options::{OptionKey, PartialVadOptions};
use crate::{Error, Result};

pub use file::{RecordingFileConfig, VadConfigFile};

/// Beacon VAD configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Controller and detector overrides
    pub options: PartialVadOptions,

    /// Directory for speech segment WAV files
    pub save_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the config file and environment
    ///
    /// # Errors
    ///
    /// Returns error if an option has an invalid value
    pub fn load() -> Result<Self> {
        Self::from_sources(file::load_config_file(), |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// Reads `BEACON_VAD_THRESHOLD`, `BEACON_VAD_DEVICE` and
    /// `BEACON_VAD_SAVE_DIR`, which take precedence over the file.
    ///
    /// # Errors
    ///
    /// Returns error if an option has an invalid value
    pub fn from_sources(
        file: VadConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut options = PartialVadOptions::default();

        for (key, value) in &file.vad {
            let text = match value {
                toml::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if !options.set(key, &text)? {
                tracing::debug!(key, "ignoring unrecognized option in config file");
            }
        }

        if let Some(threshold) = env("BEACON_VAD_THRESHOLD") {
            options.set(OptionKey::UserSpeakingThreshold.as_str(), &threshold)?;
        }
        if let Some(device) = env("BEACON_VAD_DEVICE") {
            options.input_device = Some(device);
        }

        let save_dir = env("BEACON_VAD_SAVE_DIR")
            .or(file.recording.save_dir)
            .map(PathBuf::from);

        options.validate()?;

        Ok(Self { options, save_dir })
    }

    /// Apply `key=value` pairs on top of the loaded options
    ///
    /// # Errors
    ///
    /// Returns error if a pair is malformed or has an invalid value
    pub fn apply_pairs<S: AsRef<str>>(&mut self, pairs: &[S]) -> Result<()> {
        for pair in pairs {
            let pair = pair.as_ref();
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| Error::Config(format!("expected key=value, got {pair:?}")))?;

            if !self.options.set(key.trim(), value)? {
                tracing::warn!(key = key.trim(), "ignoring unrecognized option");
            }
        }

        self.options.validate()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn file_from(toml_text: &str) -> VadConfigFile {
        toml::from_str(toml_text).unwrap()
    }

    #[test]
    fn file_options_are_applied() {
        let file = file_from(
            r#"
[vad]
start_on_ready = false
redemption_frames = 10
input_device = "USB Mic"
worklet_url = "/vad.worklet.js"
"#,
        );

        let config = Config::from_sources(file, |_| None).unwrap();
        assert_eq!(config.options.start_on_ready, Some(false));
        assert_eq!(config.options.redemption_frames, Some(10));
        assert_eq!(config.options.input_device.as_deref(), Some("USB Mic"));
        assert!(config.save_dir.is_none());
    }

    #[test]
    fn env_overrides_file() {
        let file = file_from(
            r#"
[vad]
user_speaking_threshold = 0.5

[recording]
save_dir = "/from/file"
"#,
        );
        let env: HashMap<&str, &str> = [
            ("BEACON_VAD_THRESHOLD", "0.8"),
            ("BEACON_VAD_SAVE_DIR", "/from/env"),
        ]
        .into_iter()
        .collect();

        let config =
            Config::from_sources(file, |key| env.get(key).map(ToString::to_string)).unwrap();
        assert_eq!(config.options.user_speaking_threshold, Some(0.8));
        assert_eq!(config.save_dir, Some(PathBuf::from("/from/env")));
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let file = file_from("[vad]\nuser_speaking_threshold = 3.0\n");
        assert!(Config::from_sources(file, |_| None).is_err());
    }

    #[test]
    fn pairs_override_options() {
        let mut config = Config::default();
        config
            .apply_pairs(&["initialize_on_mount=false", "min_speech_frames = 5", "model_url=x"])
            .unwrap();

        assert_eq!(config.options.initialize_on_mount, Some(false));
        assert_eq!(config.options.min_speech_frames, Some(5));
    }

    #[test]
    fn malformed_pair_is_rejected() {
        let mut config = Config::default();
        assert!(config.apply_pairs(&["start_on_ready"]).is_err());
    }
}
