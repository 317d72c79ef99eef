//! Error types for sonicmap-preview
//!
//! Internal error type; the public engine surface never returns these to the
//! UI shell. They are logged and folded into a `PlayOutcome`.

use thiserror::Error;

/// Main error type for the preview engine
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Clip fetch errors (network or filesystem)
    #[error("Fetch error for {locator}: {message}")]
    Fetch { locator: String, message: String },

    /// Audio decoding errors
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Sample rate conversion errors
    #[error("Resample error: {0}")]
    Resample(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from the shared crate (catalog, config files)
    #[error(transparent)]
    Common(#[from] sonicmap_common::Error),
}

impl Error {
    pub(crate) fn fetch(locator: &str, message: impl std::fmt::Display) -> Self {
        Error::Fetch {
            locator: locator.to_string(),
            message: message.to_string(),
        }
    }
}

/// Convenience Result type using the preview Error
pub type Result<T> = std::result::Result<T, Error>;
