//! JSON-RPC framing and handshake payloads.
//!
//! Once a bridge message is decrypted its plaintext is a JSON-RPC 2.0 object.
//! Parameters stay opaque [`serde_json::Value`]s only until the tunnel knows
//! the method; the handshake and update methods are converted straight into
//! [`SessionRequest`] and [`SessionUpdate`], everything else passes through
//! untouched as application data.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{Result, TunnelError};

/// JSON-RPC protocol version string.
pub const JSONRPC_VERSION: &str = "2.0";

/// Inbound handshake method.
pub const METHOD_SESSION_REQUEST: &str = "wc_sessionRequest";

/// In-band session control method.
pub const METHOD_SESSION_UPDATE: &str = "wc_sessionUpdate";

/// Peer metadata exchanged during the handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientInfo {
    /// Free-form description.
    pub description: String,
    /// Home page.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub url: String,
    /// Icon URLs, in order of preference.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub icons: Vec<String>,
    /// Display name.
    pub name: String,
}

/// JSON-RPC request.
///
/// Decoding is lenient about `id` and `jsonrpc` because peers are: a missing
/// version is accepted, and a numeric string id is read as a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Request id, echoed in the response. `0` when absent or not numeric.
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: i64,
    /// `"2.0"` on everything we send.
    #[serde(default)]
    pub jsonrpc: String,
    /// Method name.
    pub method: String,
    /// Positional parameters.
    #[serde(default)]
    pub params: Vec<Value>,
}

impl JsonRpcRequest {
    /// Builds a request with `jsonrpc` set to `"2.0"`.
    pub fn new(id: i64, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            id,
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }

    /// Parses a request from decrypted bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            TunnelError::Format(format!(
                "unmarshal json-rpc request error: {e}: {}",
                String::from_utf8_lossy(bytes)
            ))
        })
    }

    /// Serializes the request.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| TunnelError::Format(format!("marshal json-rpc request error: {e}")))
    }

    /// Returns the only parameter, failing if there is not exactly one.
    pub fn single_param(&self) -> Result<&Value> {
        match self.params.as_slice() {
            [param] => Ok(param),
            params => Err(TunnelError::Format(format!(
                "{} params number must be 1, got {}",
                self.method,
                params.len()
            ))),
        }
    }

    /// Decodes the only parameter into `T`.
    pub fn decode_single<T: DeserializeOwned>(&self) -> Result<T> {
        let param = self.single_param()?;
        T::deserialize(param).map_err(|e| {
            TunnelError::Format(format!("unmarshal {} param error: {e}: {param}", self.method))
        })
    }
}

fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<i64, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_i64().unwrap_or_default(),
        Value::String(s) => s.trim().parse().unwrap_or_default(),
        _ => 0,
    })
}

#[derive(Deserialize)]
struct MethodOnly {
    #[serde(default)]
    method: Option<String>,
}

/// Returns the `method` of a decrypted message without validating the rest.
///
/// `None` for anything that is not a JSON object with a string `method`.
pub fn method_of(bytes: &[u8]) -> Option<String> {
    serde_json::from_slice::<MethodOnly>(bytes).ok()?.method
}

/// JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code.
    pub code: i64,
    /// Error message.
    pub message: String,
    /// Optional structured data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Id of the request being answered.
    pub id: i64,
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Success value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// Outcome carried by a [`JsonRpcResponse`].
#[derive(Debug, Clone, PartialEq)]
pub enum RpcOutcome {
    /// The call succeeded.
    Result(Value),
    /// The call failed.
    Error(JsonRpcError),
}

impl JsonRpcResponse {
    /// Successful response to request `id`.
    pub fn success(id: i64, result: Value) -> Self {
        Self {
            id,
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
        }
    }

    /// Error response to request `id`.
    pub fn failure(id: i64, error: JsonRpcError) -> Self {
        Self {
            id,
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
        }
    }

    /// Parses a response from decrypted bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            TunnelError::Format(format!(
                "unmarshal json-rpc response error: {e}: {}",
                String::from_utf8_lossy(bytes)
            ))
        })
    }

    /// Serializes the response.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| TunnelError::Format(format!("marshal json-rpc response error: {e}")))
    }

    /// Splits the response into its outcome; exactly one of `result` and
    /// `error` must be present.
    pub fn into_outcome(self) -> Result<RpcOutcome> {
        match (self.result, self.error) {
            (Some(result), None) => Ok(RpcOutcome::Result(result)),
            (None, Some(error)) => Ok(RpcOutcome::Error(error)),
            (Some(_), Some(_)) => Err(TunnelError::Format(format!(
                "response {} carries both result and error",
                self.id
            ))),
            (None, None) => Err(TunnelError::Format(format!(
                "response {} carries neither result nor error",
                self.id
            ))),
        }
    }
}

/// Inbound handshake payload (`wc_sessionRequest` parameter).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    /// Peer's own topic.
    pub peer_id: String,
    /// Peer metadata.
    #[serde(default)]
    pub peer_meta: Option<ClientInfo>,
    /// Chain the peer asks for.
    #[serde(default)]
    pub chain_id: Option<i64>,
}

/// Outbound handshake reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    /// Our topic (the tunnel's self id).
    pub peer_id: String,
    /// Our metadata.
    pub peer_meta: ClientInfo,
    /// Active chain.
    pub chain_id: i64,
    /// Whether the session was accepted.
    pub approved: bool,
    /// Exposed accounts.
    pub accounts: Vec<String>,
}

/// In-band session control message (`wc_sessionUpdate` parameter).
///
/// Peers send `null` for chain and accounts when revoking, so both are
/// optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdate {
    /// New chain, if any.
    #[serde(default)]
    pub chain_id: Option<i64>,
    /// `false` revokes the session.
    pub approved: bool,
    /// New account list, if any.
    #[serde(default)]
    pub accounts: Option<Vec<String>>,
}
