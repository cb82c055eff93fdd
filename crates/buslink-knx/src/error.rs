/*!
 * Error types for the buslink KNX crate.
 */
use thiserror::Error;

/// Error type for KNX pipeline operations
#[derive(Error, Debug)]
pub enum KnxError {
    /// A group or individual address could not be parsed
    #[error("Invalid address: {0}")]
    AddressFormat(String),

    /// A DPT payload could not be encoded or decoded
    #[error("Conversion error: {0}")]
    Conversion(String),

    /// A service call carried an invalid request
    #[error("Validation error: {0}")]
    Validation(String),

    /// A telegram could not be delivered to the bus
    #[error("Send error: {0}")]
    Send(String),

    /// Dispatcher registration error
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] buslink_core::error::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for KNX pipeline operations
pub type Result<T> = std::result::Result<T, KnxError>;

impl KnxError {
    /// Create a new address format error
    pub fn address_format<S: AsRef<str>>(msg: S) -> Self {
        KnxError::AddressFormat(msg.as_ref().to_string())
    }

    /// Create a new conversion error
    pub fn conversion<S: AsRef<str>>(msg: S) -> Self {
        KnxError::Conversion(msg.as_ref().to_string())
    }

    /// Create a new validation error
    pub fn validation<S: AsRef<str>>(msg: S) -> Self {
        KnxError::Validation(msg.as_ref().to_string())
    }

    /// Create a new send error
    pub fn send<S: AsRef<str>>(msg: S) -> Self {
        KnxError::Send(msg.as_ref().to_string())
    }

    /// Create a new dispatch error
    pub fn dispatch<S: AsRef<str>>(msg: S) -> Self {
        KnxError::Dispatch(msg.as_ref().to_string())
    }

    /// Create a new other error
    pub fn other<S: AsRef<str>>(msg: S) -> Self {
        KnxError::Other(msg.as_ref().to_string())
    }
}

impl From<serde_json::Error> for KnxError {
    fn from(err: serde_json::Error) -> Self {
        KnxError::Serialization(err.to_string())
    }
}
