/*!
 * Error types for the buslink Z-Wave crate.
 */
use thiserror::Error;

/// Error type for Z-Wave pipeline operations
#[derive(Error, Debug)]
pub enum ZwaveError {
    /// A manufacturer/product identifier could not be parsed
    #[error("Invalid identifier: {0}")]
    IdFormat(String),

    /// Device or network configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Signal bus error
    #[error("Signal error: {0}")]
    Signal(String),

    /// Network state error
    #[error("Network error: {0}")]
    Network(String),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] buslink_core::error::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for Z-Wave pipeline operations
pub type Result<T> = std::result::Result<T, ZwaveError>;

impl ZwaveError {
    /// Create a new identifier format error
    pub fn id_format<S: AsRef<str>>(msg: S) -> Self {
        ZwaveError::IdFormat(msg.as_ref().to_string())
    }

    /// Create a new configuration error
    pub fn config<S: AsRef<str>>(msg: S) -> Self {
        ZwaveError::Config(msg.as_ref().to_string())
    }

    /// Create a new signal error
    pub fn signal<S: AsRef<str>>(msg: S) -> Self {
        ZwaveError::Signal(msg.as_ref().to_string())
    }

    /// Create a new network error
    pub fn network<S: AsRef<str>>(msg: S) -> Self {
        ZwaveError::Network(msg.as_ref().to_string())
    }

    /// Create a new other error
    pub fn other<S: AsRef<str>>(msg: S) -> Self {
        ZwaveError::Other(msg.as_ref().to_string())
    }
}

impl From<serde_json::Error> for ZwaveError {
    fn from(err: serde_json::Error) -> Self {
        ZwaveError::Serialization(err.to_string())
    }
}
