//! Upstream client errors.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    /// Could not reach the gateway or the transport failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// The connection was closed before a reply arrived.
    #[error("upstream connection closed")]
    Closed,

    /// The gateway answered with an error object.
    #[error("upstream error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, UpstreamError>;

impl From<serde_json::Error> for UpstreamError {
    fn from(err: serde_json::Error) -> Self {
        UpstreamError::Serialization(err.to_string())
    }
}
