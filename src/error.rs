use std::path::PathBuf;

use thiserror::Error;

/// Failures reported by speech engines
#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("Speech recognition could not be initialized: {0}")]
    Init(String),

    #[error("Speech recognition failed to start: {0}")]
    Start(String),

    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("Speech engine unavailable")]
    Unavailable,
}

/// Config loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}
