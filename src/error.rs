//! Error types for Beacon VAD

use thiserror::Error;

/// Result type alias for Beacon VAD operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Beacon VAD
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device or stream error
    #[error("audio error: {0}")]
    Audio(String),

    /// Detector construction or runtime error, reported verbatim
    #[error("{0}")]
    Detector(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
