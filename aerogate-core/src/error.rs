//! Protocol error taxonomy and JSON-RPC error objects.
//!
//! Only protocol violations become JSON-RPC errors. Throttling, authorization
//! denials and downstream failures are tool-level results built by the
//! dispatcher, so a caller can tell "malformed call" from "try again later".

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The closed set of JSON-RPC error codes this gateway emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Bytes are not a well-formed envelope.
    ParseError,
    /// Envelope is structurally invalid (bad version, id or method member).
    InvalidRequest,
    /// Method is not in the dispatch table.
    MethodNotFound,
    /// Method-specific parameters are malformed or fail validation.
    InvalidParams,
    /// Gateway failed to produce a response.
    InternalError,
}

impl ErrorCode {
    /// Numeric wire code.
    pub const fn code(self) -> i32 {
        match self {
            ErrorCode::ParseError => -32700,
            ErrorCode::InvalidRequest => -32600,
            ErrorCode::MethodNotFound => -32601,
            ErrorCode::InvalidParams => -32602,
            ErrorCode::InternalError => -32603,
        }
    }

    /// Canonical short message for the code.
    pub const fn message(self) -> &'static str {
        match self {
            ErrorCode::ParseError => "Parse error",
            ErrorCode::InvalidRequest => "Invalid Request",
            ErrorCode::MethodNotFound => "Method not found",
            ErrorCode::InvalidParams => "Invalid params",
            ErrorCode::InternalError => "Internal error",
        }
    }

    /// Reverse lookup from a wire code.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -32700 => Some(ErrorCode::ParseError),
            -32600 => Some(ErrorCode::InvalidRequest),
            -32601 => Some(ErrorCode::MethodNotFound),
            -32602 => Some(ErrorCode::InvalidParams),
            -32603 => Some(ErrorCode::InternalError),
            _ => None,
        }
    }
}

/// JSON-RPC error object carried in the `error` member of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Wire code from [`ErrorCode`].
    pub code: i32,

    /// Human-readable message.
    pub message: String,

    /// Optional structured context (parser message, offending field, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Protocol-level failures produced while decoding or dispatching an envelope.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    /// The bytes did not parse as a JSON object.
    #[error("Parse error: {details}")]
    Parse { details: String },

    /// The envelope is missing or mis-shapes a required member.
    #[error("Invalid request: {details}")]
    InvalidRequest { details: String },

    /// The method is not part of the closed method table.
    #[error("Method '{method}' not found")]
    MethodNotFound { method: String },

    /// Parameters could not be decoded.
    #[error("Invalid params: {details}")]
    InvalidParams { details: String },

    /// Parameters decoded but an argument failed validation.
    #[error("Invalid params: {field}: {message}")]
    InvalidArgument { field: String, message: String },

    /// The gateway itself failed.
    #[error("Internal error: {details}")]
    Internal { details: String },
}

impl ProtocolError {
    /// The closed error code this failure maps to.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ProtocolError::Parse { .. } => ErrorCode::ParseError,
            ProtocolError::InvalidRequest { .. } => ErrorCode::InvalidRequest,
            ProtocolError::MethodNotFound { .. } => ErrorCode::MethodNotFound,
            ProtocolError::InvalidParams { .. } | ProtocolError::InvalidArgument { .. } => {
                ErrorCode::InvalidParams
            }
            ProtocolError::Internal { .. } => ErrorCode::InternalError,
        }
    }

    /// Build the wire error object.
    ///
    /// The message is the canonical text for the code; the specifics go in
    /// `data` so clients can match on `message` reliably.
    pub fn to_jsonrpc_error(&self) -> JsonRpcError {
        let code = self.error_code();
        let data = match self {
            ProtocolError::Parse { details }
            | ProtocolError::InvalidRequest { details }
            | ProtocolError::InvalidParams { details }
            | ProtocolError::Internal { details } => serde_json::Value::String(details.clone()),
            ProtocolError::MethodNotFound { method } => serde_json::Value::String(method.clone()),
            ProtocolError::InvalidArgument { field, message } => serde_json::json!({
                "field": field,
                "message": message,
            }),
        };

        JsonRpcError {
            code: code.code(),
            message: code.message().to_string(),
            data: Some(data),
        }
    }
}
