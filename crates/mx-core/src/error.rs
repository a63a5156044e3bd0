//! Error types for the mixing console

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum MxError {
    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Command queue full")]
    QueueFull,
}

impl From<serde_json::Error> for MxError {
    fn from(e: serde_json::Error) -> Self {
        MxError::Serialization(e.to_string())
    }
}

/// Result type alias
pub type MxResult<T> = Result<T, MxError>;
