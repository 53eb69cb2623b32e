//! Envelope codec.
//!
//! Decoding happens in two steps. [`decode`] only insists that the bytes are a
//! JSON object and lifts out the raw envelope members; anything beyond that
//! is a parse error. [`Envelope::into_request`] then checks member shapes so
//! the dispatcher can answer with `InvalidRequest` while still echoing the
//! caller's id whenever that id is usable.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::error::{JsonRpcError, ProtocolError};

/// Envelope protocol version carried in every message.
pub const ENVELOPE_VERSION: &str = "2.0";

/// Member name of the version field. `jsonrpc` is accepted on input as an alias.
const VERSION_MEMBER: &str = "version";
const VERSION_ALIAS: &str = "jsonrpc";

/// Request identifier. Echoed verbatim on the response.
///
/// Numbers keep their original representation: `18446744073709551615`,
/// `1.0` and `1.5` come back exactly as sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcId {
    Number(Number),
    String(String),
    Null,
}

impl From<i64> for JsonRpcId {
    fn from(value: i64) -> Self {
        JsonRpcId::Number(value.into())
    }
}

impl From<i32> for JsonRpcId {
    fn from(value: i32) -> Self {
        JsonRpcId::Number(value.into())
    }
}

impl From<u64> for JsonRpcId {
    fn from(value: u64) -> Self {
        JsonRpcId::Number(value.into())
    }
}

impl From<&str> for JsonRpcId {
    fn from(value: &str) -> Self {
        JsonRpcId::String(value.to_string())
    }
}

impl From<String> for JsonRpcId {
    fn from(value: String) -> Self {
        JsonRpcId::String(value)
    }
}

impl std::fmt::Display for JsonRpcId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JsonRpcId::Number(n) => write!(f, "{n}"),
            JsonRpcId::String(s) => write!(f, "{s}"),
            JsonRpcId::Null => f.write_str("null"),
        }
    }
}

/// A decoded but not yet validated envelope.
///
/// Members are kept as raw JSON so shape errors can be reported precisely.
/// `id: None` means the member was absent, which marks a notification.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Envelope {
    pub version: Option<Value>,
    pub id: Option<Value>,
    pub method: Option<Value>,
    pub params: Option<Value>,
}

/// An envelope whose members have the right shapes.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// `None` for notifications.
    pub id: Option<JsonRpcId>,
    pub method: String,
    pub params: Option<Value>,
}

/// Shape failure, with the id to echo (when one could be read).
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedEnvelope {
    /// `None` when the envelope is a notification.
    pub id: Option<JsonRpcId>,
    pub error: ProtocolError,
}

impl Envelope {
    /// Build a request envelope.
    pub fn request(id: impl Into<JsonRpcId>, method: &str, params: Option<Value>) -> Self {
        let id = serde_json::to_value(id.into()).unwrap_or(Value::Null);
        Self {
            version: Some(Value::String(ENVELOPE_VERSION.to_string())),
            id: Some(id),
            method: Some(Value::String(method.to_string())),
            params,
        }
    }

    /// Build a notification envelope (no id).
    pub fn notification(method: &str, params: Option<Value>) -> Self {
        Self {
            version: Some(Value::String(ENVELOPE_VERSION.to_string())),
            id: None,
            method: Some(Value::String(method.to_string())),
            params,
        }
    }

    /// True when the `id` member is absent.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Check member shapes.
    ///
    /// Order matters: the id is read first so every later rejection can echo it.
    pub fn into_request(self) -> Result<Request, RejectedEnvelope> {
        let id = match self.id {
            None => None,
            Some(raw) => match parse_id(&raw) {
                Some(id) => Some(id),
                None => {
                    return Err(RejectedEnvelope {
                        id: Some(JsonRpcId::Null),
                        error: ProtocolError::InvalidRequest {
                            details: "id must be a string, a number or null".to_string(),
                        },
                    });
                }
            },
        };

        match self.version.as_ref().and_then(Value::as_str) {
            Some(ENVELOPE_VERSION) => {}
            Some(other) => {
                return Err(RejectedEnvelope {
                    id,
                    error: ProtocolError::InvalidRequest {
                        details: format!("unsupported version '{other}', expected '2.0'"),
                    },
                });
            }
            None => {
                return Err(RejectedEnvelope {
                    id,
                    error: ProtocolError::InvalidRequest {
                        details: "version must be '2.0'".to_string(),
                    },
                });
            }
        }

        let method = match self.method {
            Some(Value::String(method)) => method,
            _ => {
                return Err(RejectedEnvelope {
                    id,
                    error: ProtocolError::InvalidRequest {
                        details: "method must be a string".to_string(),
                    },
                });
            }
        };

        Ok(Request {
            id,
            method,
            params: self.params,
        })
    }
}

/// Accepts string, number or null. Booleans, arrays and objects are rejected.
fn parse_id(value: &Value) -> Option<JsonRpcId> {
    match value {
        Value::Number(n) => Some(JsonRpcId::Number(n.clone())),
        Value::String(s) => Some(JsonRpcId::String(s.clone())),
        Value::Null => Some(JsonRpcId::Null),
        _ => None,
    }
}

/// Decode raw bytes into an [`Envelope`].
///
/// # Errors
///
/// [`ProtocolError::Parse`] when the bytes are not JSON or not a JSON object
/// (batches are not part of this protocol).
pub fn decode(bytes: &[u8]) -> Result<Envelope, ProtocolError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| ProtocolError::Parse {
        details: e.to_string(),
    })?;

    let Value::Object(mut obj) = value else {
        return Err(ProtocolError::Parse {
            details: "envelope must be a JSON object".to_string(),
        });
    };

    let version = obj
        .remove(VERSION_MEMBER)
        .or_else(|| obj.remove(VERSION_ALIAS));

    Ok(Envelope {
        version,
        id: obj.remove("id"),
        method: obj.remove("method"),
        params: obj.remove("params"),
    })
}

/// Outcome member of a response: exactly one of `result` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponsePayload {
    Result(Value),
    Error(JsonRpcError),
}

/// Response envelope.
///
/// The payload enum makes "both" and "neither" unrepresentable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub version: String,
    pub id: JsonRpcId,
    #[serde(flatten)]
    pub payload: ResponsePayload,
}

impl Response {
    /// Successful response.
    pub fn success(id: JsonRpcId, result: Value) -> Self {
        Self {
            version: ENVELOPE_VERSION.to_string(),
            id,
            payload: ResponsePayload::Result(result),
        }
    }

    /// Protocol-error response.
    pub fn failure(id: JsonRpcId, error: &ProtocolError) -> Self {
        Self {
            version: ENVELOPE_VERSION.to_string(),
            id,
            payload: ResponsePayload::Error(error.to_jsonrpc_error()),
        }
    }

    /// The result member, if this is a success.
    pub fn result(&self) -> Option<&Value> {
        match &self.payload {
            ResponsePayload::Result(v) => Some(v),
            ResponsePayload::Error(_) => None,
        }
    }

    /// The error member, if this is a failure.
    pub fn error(&self) -> Option<&JsonRpcError> {
        match &self.payload {
            ResponsePayload::Result(_) => None,
            ResponsePayload::Error(e) => Some(e),
        }
    }

    /// Serialize to wire bytes (no trailing newline).
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;

    #[test]
    fn test_decode_request() {
        let env = decode(br#"{"version":"2.0","id":1,"method":"ping","params":{}}"#).unwrap();
        assert_eq!(env.version, Some(json!("2.0")));
        assert_eq!(env.id, Some(json!(1)));
        assert!(!env.is_notification());

        let req = env.into_request().unwrap();
        assert_eq!(req.id, Some(JsonRpcId::from(1)));
        assert_eq!(req.method, "ping");
        assert_eq!(req.params, Some(json!({})));
    }

    #[test]
    fn test_decode_accepts_jsonrpc_alias() {
        let env = decode(br#"{"jsonrpc":"2.0","id":"a","method":"ping"}"#).unwrap();
        let req = env.into_request().unwrap();
        assert_eq!(req.id, Some(JsonRpcId::String("a".to_string())));
    }

    #[test]
    fn test_decode_notification() {
        let env = decode(br#"{"version":"2.0","method":"notifications/initialized"}"#).unwrap();
        assert!(env.is_notification());
        let req = env.into_request().unwrap();
        assert_eq!(req.id, None);
    }

    #[test]
    fn test_decode_null_id_is_not_notification() {
        let env = decode(br#"{"version":"2.0","id":null,"method":"ping"}"#).unwrap();
        assert!(!env.is_notification());
        assert_eq!(env.into_request().unwrap().id, Some(JsonRpcId::Null));
    }

    #[test]
    fn test_decode_malformed_json() {
        let err = decode(br#"{"version":"2.0","#).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::ParseError);
    }

    #[test]
    fn test_decode_rejects_batch_array() {
        let err = decode(br#"[{"version":"2.0","id":1,"method":"ping"}]"#).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::ParseError);
    }

    #[test]
    fn test_missing_version_echoes_id() {
        let rejected = decode(br#"{"id":7,"method":"ping"}"#)
            .unwrap()
            .into_request()
            .unwrap_err();
        assert_eq!(rejected.id, Some(JsonRpcId::from(7)));
        assert_eq!(rejected.error.error_code(), ErrorCode::InvalidRequest);
    }

    #[test]
    fn test_wrong_version_shape() {
        let rejected = decode(br#"{"version":2,"id":7,"method":"ping"}"#)
            .unwrap()
            .into_request()
            .unwrap_err();
        assert_eq!(rejected.error.error_code(), ErrorCode::InvalidRequest);

        let rejected = decode(br#"{"version":"1.0","id":7,"method":"ping"}"#)
            .unwrap()
            .into_request()
            .unwrap_err();
        assert!(matches!(
            rejected.error,
            ProtocolError::InvalidRequest { ref details } if details.contains("1.0")
        ));
    }

    #[test]
    fn test_invalid_id_shape_answers_with_null_id() {
        for frame in [
            br#"{"version":"2.0","id":true,"method":"ping"}"#.as_slice(),
            br#"{"version":"2.0","id":[1],"method":"ping"}"#.as_slice(),
            br#"{"version":"2.0","id":{"n":1},"method":"ping"}"#.as_slice(),
        ] {
            let rejected = decode(frame).unwrap().into_request().unwrap_err();
            assert_eq!(rejected.id, Some(JsonRpcId::Null));
            assert_eq!(rejected.error.error_code(), ErrorCode::InvalidRequest);
        }
    }

    #[test]
    fn test_numeric_ids_echo_unchanged() {
        for raw in ["18446744073709551615", "-9223372036854775808", "1.5", "1.0", "0"] {
            let frame = format!(r#"{{"version":"2.0","id":{raw},"method":"ping"}}"#);
            let req = decode(frame.as_bytes()).unwrap().into_request().unwrap();
            let id = req.id.unwrap();

            let wire = String::from_utf8(Response::success(id, json!({})).to_bytes().unwrap()).unwrap();
            assert_eq!(wire, format!(r#"{{"version":"2.0","id":{raw},"result":{{}}}}"#));
        }
        assert_eq!(
            JsonRpcId::from(u64::MAX).to_string(),
            "18446744073709551615"
        );
    }

    #[test]
    fn test_non_string_method_is_invalid_request() {
        let rejected = decode(br#"{"version":"2.0","id":3,"method":42}"#)
            .unwrap()
            .into_request()
            .unwrap_err();
        assert_eq!(rejected.id, Some(JsonRpcId::from(3)));
        assert_eq!(rejected.error.error_code(), ErrorCode::InvalidRequest);
    }

    #[test]
    fn test_success_response_wire_shape() {
        let resp = Response::success(JsonRpcId::from(1), json!({"tools": []}));
        let wire = String::from_utf8(resp.to_bytes().unwrap()).unwrap();
        assert_eq!(wire, r#"{"version":"2.0","id":1,"result":{"tools":[]}}"#);
    }

    #[test]
    fn test_error_response_wire_shape() {
        let resp = Response::failure(
            JsonRpcId::String("x".to_string()),
            &ProtocolError::MethodNotFound {
                method: "nope".to_string(),
            },
        );
        let value: Value = serde_json::from_slice(&resp.to_bytes().unwrap()).unwrap();
        assert_eq!(value["version"], "2.0");
        assert_eq!(value["id"], "x");
        assert_eq!(value["error"]["code"], -32601);
        assert!(value.get("result").is_none());
    }

    #[test]
    fn test_null_result_is_still_present() {
        let resp = Response::success(JsonRpcId::Null, Value::Null);
        let value: Value = serde_json::from_slice(&resp.to_bytes().unwrap()).unwrap();
        assert!(value.as_object().unwrap().contains_key("result"));
        assert!(value["id"].is_null());
    }
}
