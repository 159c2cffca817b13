//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A broker frame could not be encoded or decoded.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// A broker payload was not a `{data, type}` object.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
