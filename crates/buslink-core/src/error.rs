/*!
 * Error types for the buslink core crate.
 */
use thiserror::Error;

/// Error type for buslink core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Event bus error
    #[error("Event error: {0}")]
    Event(String),

    /// Logging setup error
    #[error("Logging error: {0}")]
    Logging(String),

    /// Entity state error
    #[error("State error: {0}")]
    State(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for buslink core operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new configuration error
    pub fn config<S: AsRef<str>>(msg: S) -> Self {
        Error::Config(msg.as_ref().to_string())
    }

    /// Create a new event bus error
    pub fn event<S: AsRef<str>>(msg: S) -> Self {
        Error::Event(msg.as_ref().to_string())
    }

    /// Create a new logging error
    pub fn logging<S: AsRef<str>>(msg: S) -> Self {
        Error::Logging(msg.as_ref().to_string())
    }

    /// Create a new entity state error
    pub fn state<S: AsRef<str>>(msg: S) -> Self {
        Error::State(msg.as_ref().to_string())
    }

    /// Create a new timeout error
    pub fn timeout<S: AsRef<str>>(msg: S) -> Self {
        Error::Timeout(msg.as_ref().to_string())
    }

    /// Create a new other error
    pub fn other<S: AsRef<str>>(msg: S) -> Self {
        Error::Other(msg.as_ref().to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}
