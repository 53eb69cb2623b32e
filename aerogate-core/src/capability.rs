//! Boundary to the external capability registry.
//!
//! The dispatcher never knows what a tool does. It asks the registry for the
//! descriptors once at startup (to build its closed dispatch table) and then
//! forwards invocations by name. Implementations must be `Send + Sync`: the
//! HTTP transports call into one shared registry from many tasks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A tool as advertised by `capabilities/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON-Schema-like description of the expected arguments.
    pub input_schema: Value,
}

impl CapabilityDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            input_schema,
        }
    }
}

/// A read-only named resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    pub uri: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub mime_type: String,
}

/// Text body of a resource read.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceBody {
    pub mime_type: String,
    pub text: String,
}

/// Downstream failures. All of them surface as tool-level errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CapabilityError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("unknown resource: {0}")]
    UnknownResource(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Operation(String),
}

/// The external collaborator mapping names to backing operations.
#[async_trait]
pub trait CapabilityRegistry: Send + Sync {
    /// Every invocable tool. Read once when the dispatcher is built.
    fn descriptors(&self) -> Vec<CapabilityDescriptor>;

    /// Run a tool. `arguments` is whatever the caller sent (an object by convention).
    async fn invoke(&self, name: &str, arguments: &Value) -> Result<Value, CapabilityError>;

    fn resources(&self) -> Vec<ResourceDescriptor> {
        Vec::new()
    }

    async fn read_resource(&self, uri: &str) -> Result<ResourceBody, CapabilityError> {
        Err(CapabilityError::UnknownResource(uri.to_string()))
    }
}

/// A registry with nothing in it.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyRegistry;

#[async_trait]
impl CapabilityRegistry for EmptyRegistry {
    fn descriptors(&self) -> Vec<CapabilityDescriptor> {
        Vec::new()
    }

    async fn invoke(&self, name: &str, _arguments: &Value) -> Result<Value, CapabilityError> {
        Err(CapabilityError::UnknownTool(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_empty_registry() {
        let registry = EmptyRegistry;
        assert!(registry.descriptors().is_empty());
        assert!(registry.resources().is_empty());

        let err = registry.invoke("get_record", &json!({})).await.unwrap_err();
        assert_eq!(err, CapabilityError::UnknownTool("get_record".to_string()));

        let err = registry.read_resource("store://cluster/info").await.unwrap_err();
        assert!(matches!(err, CapabilityError::UnknownResource(_)));
    }

    #[test]
    fn test_descriptor_wire_shape() {
        let d = CapabilityDescriptor::new("get_record", "Fetch a record", json!({"type": "object"}));
        let value = serde_json::to_value(d).unwrap();
        assert_eq!(value["name"], "get_record");
        assert_eq!(value["inputSchema"]["type"], "object");
    }

    #[test]
    fn test_operation_error_displays_bare_message() {
        let err = CapabilityError::Operation("connection refused".to_string());
        assert_eq!(err.to_string(), "connection refused");
    }
}
