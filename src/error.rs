//! Error types for the kindling crate.

use std::io;
use std::time::Duration;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while racing a request across transports.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP protocol error.
    #[error("HTTP protocol error: {0}")]
    HttpProtocol(String),

    /// Retryable HTTP status observed on an attempt.
    #[error("HTTP status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    /// Every fanned-out connect attempt failed.
    #[error("failed to connect to any dialer with last error: {0}")]
    AllDialersFailed(String),

    /// A transport worker panicked while establishing a connection.
    #[error("panic in dialer: {0}")]
    DialerPanic(String),

    /// The per-request deadline fired before any transport produced a response.
    #[error("request deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    /// The caller cancelled the request.
    #[error("request canceled")]
    Canceled,

    /// No registered transport matches the given name.
    #[error("could not find matching transport: {0}")]
    TransportNotFound(String),

    /// The race ended without a response or a terminal error.
    #[error("failed to get response")]
    NoResponse,

    /// Connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// TLS error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Decompression error.
    #[error("decompression error: {0}")]
    Decompression(String),

    /// JSON deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Create an HTTP status error.
    pub fn http_status(status: u16, message: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            message: message.into(),
        }
    }

    /// Create an HTTP protocol error.
    pub fn http_protocol(message: impl Into<String>) -> Self {
        Self::HttpProtocol(message.into())
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a TLS error.
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls(message.into())
    }
}
