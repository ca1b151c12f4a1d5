//! JSON-RPC shaped envelopes exchanged with tool helpers.
//!
//! Outbound messages are [`Envelope`]s: a request when `id` is set, a
//! notification when it is not. Inbound responses are parsed from single
//! lines by [`parse_response_line`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AppError, Result};

/// JSON-RPC version tag written on every outbound envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// One outbound protocol message.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Envelope {
    /// Always [`JSONRPC_VERSION`].
    pub jsonrpc: &'static str,
    /// Correlation id; absent for notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Method name, e.g. `initialize` or `tools/call`.
    pub method: String,
    /// Method parameters; always an object on the wire.
    pub params: Value,
}

impl Envelope {
    /// Build a request that expects a correlated response.
    #[must_use]
    pub fn request(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    /// Build a fire-and-forget notification.
    #[must_use]
    pub fn notification(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: None,
            method: method.into(),
            params,
        }
    }

    /// Whether this envelope is a notification.
    #[must_use]
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Serialize to a compact single-line JSON string (no trailing newline).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Protocol` if serialization fails.
    pub fn to_line(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| AppError::Protocol(format!("failed to serialise envelope: {e}")))
    }
}

/// Error object carried by a failed response.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RpcError {
    /// Numeric error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail.
    #[serde(default)]
    pub data: Option<Value>,
}

/// A response correlated to an earlier request.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcResponse {
    /// Id of the request this answers.
    pub id: u64,
    /// Success payload.
    pub result: Option<Value>,
    /// Failure payload.
    pub error: Option<RpcError>,
}

impl RpcResponse {
    /// Convert into the success payload, treating `error` as a failure.
    ///
    /// A response with neither `result` nor `error` yields `Value::Null`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Protocol` when the response carries an `error`.
    pub fn into_result(self) -> Result<Value> {
        if let Some(err) = self.error {
            return Err(AppError::Protocol(format!(
                "request {} failed with code {}: {}",
                self.id, err.code, err.message
            )));
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

/// Raw inbound shape; every field optional so unrelated lines still parse.
#[derive(Debug, Deserialize)]
struct InboundEnvelope {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

/// Outcome of parsing one line of helper output.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundLine {
    /// A response with an integer id.
    Response(RpcResponse),
    /// A server-initiated request or notification; never a response.
    ServerMessage {
        /// The server's method name.
        method: String,
    },
    /// Blank line, non-JSON text, or JSON that is not a usable envelope.
    Ignored {
        /// Why the line was skipped.
        reason: String,
    },
}

/// Classify one line of helper output.
///
/// Never fails: malformed input is reported as [`InboundLine::Ignored`] so
/// that log chatter and partial writes on the same stream only delay
/// matching.
#[must_use]
pub fn parse_response_line(line: &str) -> InboundLine {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return InboundLine::Ignored {
            reason: "blank line".into(),
        };
    }

    let envelope: InboundEnvelope = match serde_json::from_str(trimmed) {
        Ok(env) => env,
        Err(e) => {
            return InboundLine::Ignored {
                reason: format!("malformed json: {e}"),
            }
        }
    };

    if let Some(method) = envelope.method {
        return InboundLine::ServerMessage { method };
    }

    let Some(id) = envelope.id.as_ref().and_then(Value::as_u64) else {
        return InboundLine::Ignored {
            reason: "missing or non-integer id".into(),
        };
    };

    InboundLine::Response(RpcResponse {
        id,
        result: envelope.result,
        error: envelope.error,
    })
}
