//! Error types for squall-native

use thiserror::Error;

/// Result type alias for native server operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the native server
#[derive(Debug, Error)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Hyper error
    #[error("HTTP error: {0}")]
    Hyper(String),

    /// Listen address could not be parsed
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Body too large
    #[error("Body too large: exceeds limit of {limit} bytes")]
    BodyTooLarge { limit: usize },

    /// Request aborted before the body was read
    #[error("Request aborted")]
    Aborted,

    /// Write to a WebSocket after it closed
    #[error("Socket closed")]
    SocketClosed,
}

impl From<hyper::Error> for Error {
    fn from(err: hyper::Error) -> Self {
        Error::Hyper(err.to_string())
    }
}
