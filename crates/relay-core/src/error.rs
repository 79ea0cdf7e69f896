//! Error types for the intent relay.

use thiserror::Error;

/// JSON-RPC error code for a request that is not a valid request object.
pub const CODE_INVALID_REQUEST: i64 = -32600;
/// JSON-RPC error code for an unknown method.
pub const CODE_METHOD_NOT_FOUND: i64 = -32601;
/// JSON-RPC error code for missing or malformed params.
pub const CODE_INVALID_PARAMS: i64 = -32602;
/// JSON-RPC error code for server-side failures.
pub const CODE_INTERNAL_ERROR: i64 = -32603;

/// Main error type for relay operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Malformed request body or missing required field.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Transport failure talking to the upstream network.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The upstream replied with something we could not parse.
    #[error("malformed upstream response: {0}")]
    MalformedUpstreamResponse(String),

    /// The owner already holds a subscription of this type.
    #[error("subscription already exists for type: {subscription_type}, id: {id}")]
    DuplicateSubscription { subscription_type: String, id: String },

    /// No subscription with this id exists for the owner.
    #[error("subscription not found for id: {0}")]
    SubscriptionNotFound(String),

    /// The requested subscription type is not supported.
    #[error("invalid 'subscription_type' param: '{requested}', valid values are: {valid}")]
    InvalidSubscriptionType { requested: String, valid: String },

    /// A single payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

impl RelayError {
    /// JSON-RPC error code used when this error is surfaced on the streaming channel.
    pub fn rpc_code(&self) -> i64 {
        match self {
            RelayError::InvalidRequest(_) | RelayError::Decode(_) => CODE_INVALID_PARAMS,
            RelayError::DuplicateSubscription { .. }
            | RelayError::SubscriptionNotFound(_)
            | RelayError::InvalidSubscriptionType { .. } => CODE_INVALID_REQUEST,
            RelayError::UpstreamUnavailable(_) | RelayError::MalformedUpstreamResponse(_) => {
                CODE_INTERNAL_ERROR
            }
        }
    }

    /// Returns true if the caller is at fault rather than the relay or upstream.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            RelayError::UpstreamUnavailable(_) | RelayError::MalformedUpstreamResponse(_)
        )
    }
}

/// Convenience Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Decode(err.to_string())
    }
}

impl From<base64::DecodeError> for RelayError {
    fn from(err: base64::DecodeError) -> Self {
        RelayError::Decode(err.to_string())
    }
}
