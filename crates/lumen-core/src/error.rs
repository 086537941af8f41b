//! Error types for Lumen Core.

use crate::config::ConfigError;
use lumen_training::TrainingError;
use thiserror::Error;

/// Core error type for session operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A signal name was claimed twice
    #[error("signal `{0}` is already registered")]
    DuplicateKey(String),

    /// A signal name was never registered
    #[error("signal `{0}` is not registered")]
    UnknownKey(String),

    /// A submission is missing a required field
    #[error("missing inputs: {0}")]
    MissingInputs(String),

    /// A signal was invoked with arguments of the wrong shape
    #[error("signal `{name}` expected {expected}")]
    BadPayload { name: String, expected: &'static str },

    /// Training, weight and pipeline errors
    #[error(transparent)]
    Training(#[from] TrainingError),

    /// Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Directory traversal errors while fingerprinting
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Result type alias for session operations.
pub type CoreResult<T> = std::result::Result<T, CoreError>;
