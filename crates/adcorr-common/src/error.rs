//! Error types shared across adcorr crates

use thiserror::Error;

/// Result type alias for adcorr operations
pub type Result<T> = std::result::Result<T, AdcorrError>;

/// Main error type for adcorr
#[derive(Error, Debug)]
pub enum AdcorrError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AdcorrError {
    /// Shorthand for a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        AdcorrError::Config(msg.into())
    }
}
