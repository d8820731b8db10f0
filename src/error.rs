//! Error types for remote stream operations.

use thiserror::Error;

/// Result type for stream operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while opening or reading a remote stream.
#[derive(Error, Debug)]
pub enum Error {
    /// Server ignored `Range` in a situation the whole-object fallback
    /// could not absorb.
    #[error("server does not support byte ranges: {0}")]
    UnsupportedRange(String),

    /// Remote object does not exist (HTTP 404).
    #[error("remote object not found: {0}")]
    NotFound(String),

    /// Network connection failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Request timed out.
    #[error("request timeout: {0}")]
    Timeout(String),

    /// Unexpected HTTP status.
    #[error("HTTP error: {status} - {message}")]
    Http { status: u16, message: String },

    /// Response was well-formed HTTP but unusable.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The remote object changed mid-session. Cached bytes and fresh bytes
    /// can no longer be guaranteed to come from the same object version.
    #[error("remote object changed during read: validator was {expected:?}, server sent {actual:?}")]
    StaleObject {
        expected: Option<String>,
        actual: Option<String>,
    },

    /// Seek resolved to a position before the start of the object.
    #[error("invalid seek by offset {position}")]
    InvalidSeek { position: i64 },

    /// Operation on a closed stream.
    #[error("stream is closed")]
    Closed,

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Invalid URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl Error {
    /// Check if the error is transient at the transport level.
    pub(crate) fn is_retryable(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Timeout(_))
    }

    /// Whether the error ends the session.
    ///
    /// Everything is fatal except the range-support probe outcome, which
    /// degrades to the whole-object fallback inside `open`.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::UnsupportedRange(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else if e.is_connect() {
            Error::Connection(e.to_string())
        } else if let Some(status) = e.status() {
            Error::Http {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            Error::Connection(e.to_string())
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::InvalidUrl(e.to_string())
    }
}
