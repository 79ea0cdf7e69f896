//! JSON-RPC envelopes of the solver streaming protocol.

use relay_core::error::{CODE_INVALID_PARAMS, CODE_METHOD_NOT_FOUND};
use relay_core::RelayError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A request from the client.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

impl RpcRequest {
    /// Deserialize the params object into `T`.
    pub fn params<T: DeserializeOwned>(&self) -> Result<T, RpcError> {
        let params = match &self.params {
            Some(Value::Null) | None => {
                return Err(RpcError::invalid_params("params value is missing"))
            }
            Some(params) => params.clone(),
        };

        serde_json::from_value(params)
            .map_err(|e| RpcError::invalid_params(format!("failed to parse params: {}", e)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(CODE_INVALID_PARAMS, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            CODE_METHOD_NOT_FOUND,
            format!("unsupported method name: {}", method),
        )
    }

    /// Surface a relay error, prefixed with what was being attempted.
    pub fn from_relay(context: &str, err: &RelayError) -> Self {
        Self::new(err.rpc_code(), format!("{}: {}", context, err))
    }
}

/// A reply to one request.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PushParams<'a, T: Serialize> {
    pub subscription: &'a str,
    pub result: &'a T,
}

/// A server-initiated notification on a subscription.
#[derive(Debug, Serialize)]
pub struct RpcPush<'a, T: Serialize> {
    pub jsonrpc: &'static str,
    pub method: &'static str,
    pub params: PushParams<'a, T>,
}

impl<'a, T: Serialize> RpcPush<'a, T> {
    pub fn subscription(subscription: &'a str, result: &'a T) -> Self {
        Self {
            jsonrpc: "2.0",
            method: "subscribe",
            params: PushParams {
                subscription,
                result,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SubscribeParams {
    #[serde(default)]
    pub subscription_type: String,
}

#[derive(Debug, Deserialize)]
pub struct UnsubscribeParams {
    #[serde(default)]
    pub subscription_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitSolverOperationParams {
    pub intent_id: String,
    pub intent_solution: serde_json::Map<String, Value>,
}
