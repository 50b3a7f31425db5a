//! Error handling for the Courier CLI

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Courier error: {0}")]
    Courier(#[from] courier_core::CourierError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transcript error at line {line}: {reason}")]
    Transcript { line: usize, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("TOML rendering error: {0}")]
    TomlRendering(#[from] toml::ser::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        // Alternate form keeps the whole context chain on one line.
        CliError::Config(format!("{err:#}"))
    }
}
