//! Request dispatcher.
//!
//! Turns one inbound frame into zero or one outbound frame. The pipeline for
//! an invocation is:
//!
//! 1. authorization by role (denied → tool-level error, audited as `AUTH`)
//! 2. rate limiting for mutating operations (denied → tool-level error)
//! 3. parameter decoding and argument validation (→ `InvalidParams`)
//! 4. invocation through the capability registry (failure → tool-level error)
//! 5. exactly one audit event for the call
//!
//! Only invocations and resource reads reach the audit trail. Lifecycle and
//! catalog methods are answered without side effects.
//!
//! The dispatcher holds no mutable state of its own. Shared state lives behind
//! the rate limiter's and the audit log's own locks, so one dispatcher serves
//! every session of every transport concurrently. The one other write is the
//! handshake: `initialize` records the client name on the caller's own
//! session (behind that session's lock), so later audit events carry it as
//! the user. Detached contexts have no session and record nothing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::audit::{AuditCategory, AuditEvent, AuditLevel, AuditLog};
use crate::capability::{CapabilityDescriptor, CapabilityRegistry};
use crate::error::ProtocolError;
use crate::jsonrpc::{self, Envelope, JsonRpcId, Request, Response};
use crate::protocol::{
    AccessRole, CallCapabilityParams, CallCapabilityResult, ClientInfo, InitializeParams,
    InitializeResult, ListCapabilitiesResult, ListPromptsResult, ListResourcesResult, Method,
    MethodKind, OperationCategory, PROTOCOL_VERSION, ReadResourceParams, ReadResourceResult, ResourceContent,
    ServerCapabilities, ServerInfo,
};
use crate::rate_limiter::RateLimiter;
use crate::session::{Session, SessionId, TransportKind};
use crate::validator::Validator;
use crate::{SERVER_NAME, SERVER_VERSION};

const RATE_LIMITED_MESSAGE: &str = "Error: rate limit exceeded, please try again later";

// ─────────────────────────────────────────────────────────────────────────────
// Request context
// ─────────────────────────────────────────────────────────────────────────────

/// Per-request caller metadata, passed explicitly down to the audit trail.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub transport: TransportKind,
    pub session_id: Option<SessionId>,
    /// Caller identity (the handshake client name unless overridden).
    pub user: Option<String>,
    session: Option<Arc<Session>>,
}

impl RequestContext {
    /// A context with no backing session.
    pub fn detached(transport: TransportKind) -> Self {
        Self {
            transport,
            session_id: None,
            user: None,
            session: None,
        }
    }

    pub fn for_session(session: &Arc<Session>) -> Self {
        Self {
            transport: session.transport(),
            session_id: Some(session.id()),
            user: session.client_name(),
            session: Some(Arc::clone(session)),
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn client_id(&self) -> Option<String> {
        self.session_id.map(|id| id.to_string())
    }

    fn remember_client(&self, client: &ClientInfo) {
        if let Some(session) = &self.session {
            session.set_client_name(client.name.clone());
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dispatcher
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct ToolEntry {
    descriptor: CapabilityDescriptor,
    category: OperationCategory,
}

/// Audit subject extracted from invocation arguments. Identifiers only.
#[derive(Debug, Default)]
struct Subject {
    namespace: Option<String>,
    set: Option<String>,
    key: Option<String>,
    record_count: Option<usize>,
}

impl Subject {
    fn from_arguments(arguments: Option<&Value>) -> Self {
        let Some(args) = arguments.and_then(Value::as_object) else {
            return Self::default();
        };
        let text = |name: &str| match args.get(name) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        Self {
            namespace: text("namespace"),
            set: text("set_name").or_else(|| text("set")),
            key: text("key"),
            record_count: ["keys", "records"]
                .iter()
                .find_map(|m| args.get(*m).and_then(Value::as_array).map(Vec::len)),
        }
    }
}

pub struct Dispatcher {
    registry: Arc<dyn CapabilityRegistry>,
    tools: Vec<ToolEntry>,
    tool_index: HashMap<String, usize>,
    role: AccessRole,
    limiter: Arc<RateLimiter>,
    audit: Arc<AuditLog>,
    validator: Validator,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("tools", &self.tool_index.len())
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Build the dispatch table from the registry's descriptors.
    pub fn new(
        registry: Arc<dyn CapabilityRegistry>,
        role: AccessRole,
        limiter: Arc<RateLimiter>,
        audit: Arc<AuditLog>,
        validator: Validator,
    ) -> Self {
        let mut tools = Vec::new();
        let mut tool_index = HashMap::new();
        for descriptor in registry.descriptors() {
            if tool_index.contains_key(&descriptor.name) {
                warn!(tool = %descriptor.name, "Duplicate tool descriptor ignored");
                continue;
            }
            tool_index.insert(descriptor.name.clone(), tools.len());
            tools.push(ToolEntry {
                category: OperationCategory::classify(&descriptor.name),
                descriptor,
            });
        }

        debug!(tools = tools.len(), role = %role, "Dispatch table built");

        Self {
            registry,
            tools,
            tool_index,
            role,
            limiter,
            audit,
            validator,
        }
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn role(&self) -> AccessRole {
        self.role
    }

    /// Decode, dispatch and encode one frame.
    ///
    /// Returns `None` when nothing must be written back (notifications).
    pub async fn handle_bytes(&self, ctx: &RequestContext, bytes: &[u8]) -> Option<Vec<u8>> {
        let response = match jsonrpc::decode(bytes) {
            Ok(envelope) => self.dispatch(ctx, envelope).await?,
            Err(e) => {
                debug!(error = %e, transport = %ctx.transport, "Undecodable frame");
                Response::failure(JsonRpcId::Null, &e)
            }
        };
        encode(response)
    }

    /// Dispatch a decoded envelope.
    ///
    /// Requests (id present) always get exactly one response carrying their
    /// id. Notifications are executed but never answered, even on error.
    pub async fn dispatch(&self, ctx: &RequestContext, envelope: Envelope) -> Option<Response> {
        let Request { id, method, params } = match envelope.into_request() {
            Ok(request) => request,
            Err(rejected) => {
                debug!(error = %rejected.error, "Rejected envelope");
                return rejected
                    .id
                    .map(|id| Response::failure(id, &rejected.error));
            }
        };

        let outcome = match Method::from_name(&method) {
            Some(known) => self.route(ctx, known, params).await,
            None => {
                debug!(method = %method, "Unknown method");
                Err(ProtocolError::MethodNotFound { method })
            }
        };

        let id = id?;
        Some(match outcome {
            Ok(result) => Response::success(id, result),
            Err(e) => Response::failure(id, &e),
        })
    }

    async fn route(
        &self,
        ctx: &RequestContext,
        method: Method,
        params: Option<Value>,
    ) -> Result<Value, ProtocolError> {
        match method.kind() {
            MethodKind::Lifecycle => self.lifecycle(ctx, method, params),
            MethodKind::Catalog => self.catalog(method),
            MethodKind::Invocation => self.call_capability(ctx, params).await,
            MethodKind::ResourceRead => self.read_resource(ctx, params).await,
        }
    }

    fn lifecycle(
        &self,
        ctx: &RequestContext,
        method: Method,
        params: Option<Value>,
    ) -> Result<Value, ProtocolError> {
        match method {
            Method::Initialize => self.initialize(ctx, params),
            _ => Ok(Value::Object(Default::default())),
        }
    }

    fn catalog(&self, method: Method) -> Result<Value, ProtocolError> {
        match method {
            Method::ListCapabilities => to_result(&ListCapabilitiesResult {
                tools: self
                    .tools
                    .iter()
                    .filter(|t| self.role.permits(t.category))
                    .map(|t| t.descriptor.clone())
                    .collect(),
            }),
            Method::ListResources => to_result(&ListResourcesResult {
                resources: self.registry.resources(),
            }),
            _ => to_result(&ListPromptsResult::default()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Handshake
    // ─────────────────────────────────────────────────────────────────────────

    fn initialize(
        &self,
        ctx: &RequestContext,
        params: Option<Value>,
    ) -> Result<Value, ProtocolError> {
        let params: InitializeParams = match params {
            None | Some(Value::Null) => InitializeParams::default(),
            Some(p) => decode_params(p)?,
        };

        if let Some(client) = &params.client_info {
            debug!(
                client = %client.name,
                client_protocol = ?params.protocol_version,
                "Client handshake"
            );
            ctx.remember_client(client);
        }

        to_result(&InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities::default(),
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: SERVER_VERSION.to_string(),
            },
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Invocation pipeline
    // ─────────────────────────────────────────────────────────────────────────

    async fn call_capability(
        &self,
        ctx: &RequestContext,
        params: Option<Value>,
    ) -> Result<Value, ProtocolError> {
        let started = Instant::now();
        let params = params.unwrap_or(Value::Null);

        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::InvalidParams {
                details: "missing tool name".to_string(),
            })?
            .to_string();

        let category = self
            .tool_index
            .get(&name)
            .map(|&i| self.tools[i].category)
            .unwrap_or_else(|| OperationCategory::classify(&name));
        let subject = Subject::from_arguments(params.get("arguments"));
        let event = |level: AuditLevel, audit_category: AuditCategory| {
            self.base_event(ctx, level, audit_category, &name, &subject)
        };

        if !self.role.permits(category) {
            warn!(tool = %name, role = %self.role, "Invocation denied by role");
            self.audit.log(
                event(AuditLevel::Warning, AuditCategory::Auth)
                    .with_duration(started.elapsed())
                    .with_detail("required", category_name(category))
                    .failed("permission denied"),
            );
            return to_result(&CallCapabilityResult::failure(format!(
                "Error: permission denied: '{name}' requires {} access (role: {})",
                category_name(category),
                self.role
            )));
        }

        if category.is_mutating() && !self.limiter.allow() {
            warn!(tool = %name, "Invocation rate limited");
            self.audit.log(
                event(AuditLevel::Warning, category.into())
                    .with_duration(started.elapsed())
                    .failed("rate limit exceeded"),
            );
            return to_result(&CallCapabilityResult::failure(RATE_LIMITED_MESSAGE));
        }

        let call: CallCapabilityParams = match decode_params(params) {
            Ok(call) => call,
            Err(e) => {
                self.audit.log(
                    event(AuditLevel::Error, category.into())
                        .with_duration(started.elapsed())
                        .failed(e.to_string()),
                );
                return Err(e);
            }
        };

        if let Err(e) = self.validator.validate_arguments(&call.arguments) {
            debug!(tool = %name, field = %e.field, "Argument validation failed");
            self.audit.log(
                event(AuditLevel::Error, category.into())
                    .with_duration(started.elapsed())
                    .failed(e.to_string()),
            );
            return Err(ProtocolError::InvalidArgument {
                field: e.field,
                message: e.message,
            });
        }

        let outcome = if self.tool_index.contains_key(&name) {
            self.registry.invoke(&name, &call.arguments).await
        } else {
            Err(crate::capability::CapabilityError::UnknownTool(name.clone()))
        };
        let duration = started.elapsed();

        match outcome {
            Ok(value) => {
                let level = if category.is_mutating() {
                    AuditLevel::Audit
                } else {
                    AuditLevel::Info
                };
                self.audit
                    .log(event(level, category.into()).with_duration(duration));

                let text = serde_json::to_string_pretty(&value).map_err(|e| {
                    ProtocolError::Internal {
                        details: e.to_string(),
                    }
                })?;
                to_result(&CallCapabilityResult::success(text))
            }
            Err(e) => {
                debug!(tool = %name, error = %e, "Invocation failed");
                self.audit.log(
                    event(AuditLevel::Error, category.into())
                        .with_duration(duration)
                        .failed(e.to_string()),
                );
                to_result(&CallCapabilityResult::failure(format!("Error: {e}")))
            }
        }
    }

    async fn read_resource(
        &self,
        ctx: &RequestContext,
        params: Option<Value>,
    ) -> Result<Value, ProtocolError> {
        let started = Instant::now();
        let params: ReadResourceParams = decode_params(params.unwrap_or(Value::Null))?;

        let outcome = self.registry.read_resource(&params.uri).await;
        let event = self
            .base_event(
                ctx,
                AuditLevel::Info,
                AuditCategory::Read,
                "read_resource",
                &Subject::default(),
            )
            .with_detail("uri", params.uri.clone())
            .with_duration(started.elapsed());

        match outcome {
            Ok(body) => {
                self.audit.log(event);
                to_result(&ReadResourceResult {
                    contents: vec![ResourceContent {
                        uri: params.uri,
                        mime_type: body.mime_type,
                        text: body.text,
                    }],
                    is_error: false,
                })
            }
            Err(e) => {
                let mut event = event.failed(e.to_string());
                event.level = AuditLevel::Error;
                self.audit.log(event);
                to_result(&ReadResourceResult {
                    contents: vec![ResourceContent {
                        uri: params.uri,
                        mime_type: "text/plain".to_string(),
                        text: format!("Error: {e}"),
                    }],
                    is_error: true,
                })
            }
        }
    }

    fn base_event(
        &self,
        ctx: &RequestContext,
        level: AuditLevel,
        category: AuditCategory,
        operation: &str,
        subject: &Subject,
    ) -> AuditEvent {
        let mut event = AuditEvent::new(level, category, operation)
            .with_subject(
                subject.namespace.clone(),
                subject.set.clone(),
                subject.key.clone(),
            )
            .with_caller(ctx.user.clone(), ctx.client_id())
            .with_detail("transport", ctx.transport.as_str());
        if let Some(count) = subject.record_count {
            event = event.with_record_count(count);
        }
        event
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn category_name(category: OperationCategory) -> &'static str {
    match category {
        OperationCategory::Read => "read",
        OperationCategory::Write => "write",
        OperationCategory::Admin => "admin",
    }
}

fn decode_params<T: DeserializeOwned>(params: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(params).map_err(|e| ProtocolError::InvalidParams {
        details: e.to_string(),
    })
}

fn to_result<T: serde::Serialize>(value: &T) -> Result<Value, ProtocolError> {
    serde_json::to_value(value).map_err(|e| ProtocolError::Internal {
        details: e.to_string(),
    })
}

fn encode(response: Response) -> Option<Vec<u8>> {
    match response.to_bytes() {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            error!(error = %e, id = %response.id, "Failed to encode response");
            Response::failure(
                response.id,
                &ProtocolError::Internal {
                    details: "response encoding failed".to_string(),
                },
            )
            .to_bytes()
            .ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{CapabilityError, EmptyRegistry, ResourceBody, ResourceDescriptor};
    use crate::config::{AuditConfig, RateLimitConfig};
    use crate::session::{OverflowPolicy, SessionRegistry};
    use async_trait::async_trait;
    use serde_json::json;

    /// Registry with one tool of each category.
    struct StubRegistry;

    #[async_trait]
    impl CapabilityRegistry for StubRegistry {
        fn descriptors(&self) -> Vec<CapabilityDescriptor> {
            ["get_record", "put_record", "truncate_set", "explode"]
                .into_iter()
                .map(|n| CapabilityDescriptor::new(n, "stub", json!({"type": "object"})))
                .collect()
        }

        async fn invoke(&self, name: &str, arguments: &Value) -> Result<Value, CapabilityError> {
            match name {
                "explode" => Err(CapabilityError::Operation("backend unavailable".to_string())),
                _ => Ok(json!({"tool": name, "echo": arguments})),
            }
        }

        fn resources(&self) -> Vec<ResourceDescriptor> {
            vec![ResourceDescriptor {
                uri: "store://cluster/info".to_string(),
                name: "Cluster".to_string(),
                description: None,
                mime_type: "application/json".to_string(),
            }]
        }

        async fn read_resource(&self, uri: &str) -> Result<ResourceBody, CapabilityError> {
            if uri == "store://cluster/info" {
                Ok(ResourceBody {
                    mime_type: "application/json".to_string(),
                    text: "{}".to_string(),
                })
            } else {
                Err(CapabilityError::UnknownResource(uri.to_string()))
            }
        }
    }

    fn audit() -> Arc<AuditLog> {
        Arc::new(AuditLog::with_writer(
            &AuditConfig::default(),
            Box::new(std::io::sink()),
        ))
    }

    fn dispatcher_with(role: AccessRole, limiter: RateLimiter) -> Dispatcher {
        Dispatcher::new(
            Arc::new(StubRegistry),
            role,
            Arc::new(limiter),
            audit(),
            Validator::default(),
        )
    }

    fn dispatcher(role: AccessRole) -> Dispatcher {
        dispatcher_with(role, RateLimiter::disabled())
    }

    fn ctx() -> RequestContext {
        RequestContext::detached(TransportKind::Stdio)
    }

    async fn call(d: &Dispatcher, id: i64, method: &str, params: Value) -> Response {
        d.dispatch(&ctx(), Envelope::request(id, method, Some(params)))
            .await
            .expect("request must be answered")
    }

    #[tokio::test]
    async fn test_empty_registry_lists_no_tools() {
        let d = Dispatcher::new(
            Arc::new(EmptyRegistry),
            AccessRole::ReadOnly,
            Arc::new(RateLimiter::disabled()),
            audit(),
            Validator::default(),
        );
        let out = d
            .handle_bytes(&ctx(), br#"{"version":"2.0","id":1,"method":"capabilities/list"}"#)
            .await
            .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            r#"{"version":"2.0","id":1,"result":{"tools":[]}}"#
        );
    }

    #[tokio::test]
    async fn test_parse_error_answers_with_null_id() {
        let d = dispatcher(AccessRole::Admin);
        let out = d.handle_bytes(&ctx(), b"{not json").await.unwrap();
        let value: Value = serde_json::from_slice(&out).unwrap();
        assert!(value["id"].is_null());
        assert_eq!(value["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let d = dispatcher(AccessRole::Admin);
        let resp = call(&d, 4, "tools/explode", json!({})).await;
        assert_eq!(resp.id, JsonRpcId::from(4));
        assert_eq!(resp.error().unwrap().code, -32601);
    }

    #[tokio::test]
    async fn test_missing_version_is_invalid_request() {
        let d = dispatcher(AccessRole::Admin);
        let out = d
            .handle_bytes(&ctx(), br#"{"id":"abc","method":"ping"}"#)
            .await
            .unwrap();
        let value: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["id"], "abc");
        assert_eq!(value["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn test_notifications_are_never_answered() {
        let d = dispatcher(AccessRole::Admin);
        for frame in [
            r#"{"version":"2.0","method":"notifications/initialized"}"#,
            r#"{"version":"2.0","method":"no/such/method"}"#,
            r#"{"method":"ping"}"#,
        ] {
            assert!(d.handle_bytes(&ctx(), frame.as_bytes()).await.is_none(), "{frame}");
        }
    }

    #[tokio::test]
    async fn test_notification_invocation_still_runs_and_is_audited() {
        let d = dispatcher(AccessRole::Admin);
        let env = Envelope::notification(
            "tools/call",
            Some(json!({"name": "put_record", "arguments": {"namespace": "test", "key": "k"}})),
        );
        assert!(d.dispatch(&ctx(), env).await.is_none());
        assert_eq!(d.audit().recent_events(10).len(), 1);
    }

    #[tokio::test]
    async fn test_initialize_handshake() {
        let registry = SessionRegistry::new(TransportKind::Sse, 10, OverflowPolicy::DropNewest);
        let session = registry.create();
        let d = dispatcher(AccessRole::ReadOnly);

        let resp = d
            .dispatch(
                &RequestContext::for_session(&session),
                Envelope::request(
                    1,
                    "initialize",
                    Some(json!({"protocolVersion": "2024-11-05", "clientInfo": {"name": "inspector"}})),
                ),
            )
            .await
            .unwrap();

        let result = resp.result().unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], "aerogate");
        assert_eq!(session.client_name().as_deref(), Some("inspector"));
        assert_eq!(
            RequestContext::for_session(&session).user.as_deref(),
            Some("inspector")
        );
    }

    #[tokio::test]
    async fn test_lifecycle_methods() {
        let d = dispatcher(AccessRole::ReadOnly);
        assert_eq!(call(&d, 1, "ping", json!({})).await.result(), Some(&json!({})));
        assert_eq!(call(&d, 2, "shutdown", json!({})).await.result(), Some(&json!({})));
        assert_eq!(
            call(&d, 3, "prompts/list", json!({})).await.result(),
            Some(&json!({"prompts": []}))
        );
    }

    #[tokio::test]
    async fn test_listing_is_filtered_by_role() {
        let names = |resp: Response| -> Vec<String> {
            resp.result().unwrap()["tools"]
                .as_array()
                .unwrap()
                .iter()
                .map(|t| t["name"].as_str().unwrap().to_string())
                .collect()
        };

        let ro = names(call(&dispatcher(AccessRole::ReadOnly), 1, "tools/list", json!({})).await);
        assert_eq!(ro, vec!["get_record", "explode"]);

        let rw = names(call(&dispatcher(AccessRole::ReadWrite), 1, "tools/list", json!({})).await);
        assert_eq!(rw, vec!["get_record", "put_record", "explode"]);

        let admin = names(call(&dispatcher(AccessRole::Admin), 1, "tools/list", json!({})).await);
        assert_eq!(admin.len(), 4);
    }

    #[tokio::test]
    async fn test_successful_read_call() {
        let d = dispatcher(AccessRole::ReadOnly);
        let resp = call(
            &d,
            9,
            "capabilities/call",
            json!({"name": "get_record", "arguments": {"namespace": "test", "set_name": "users", "key": "u1"}}),
        )
        .await;

        let result = resp.result().unwrap();
        assert!(result.get("isError").is_none());
        let text = result["content"][0]["text"].as_str().unwrap();
        let echoed: Value = serde_json::from_str(text).unwrap();
        assert_eq!(echoed["tool"], "get_record");

        let events = d.audit().recent_events(10);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, AuditLevel::Info);
        assert_eq!(events[0].category, AuditCategory::Read);
        assert_eq!(events[0].namespace.as_deref(), Some("test"));
        assert_eq!(events[0].set.as_deref(), Some("users"));
        assert_eq!(events[0].key.as_deref(), Some("u1"));
        assert!(events[0].success);
    }

    #[tokio::test]
    async fn test_write_success_is_audit_level_without_payload() {
        let d = dispatcher(AccessRole::ReadWrite);
        call(
            &d,
            1,
            "tools/call",
            json!({"name": "put_record", "arguments": {"namespace": "test", "key": "k", "bins": {"secret": "hunter2"}}}),
        )
        .await;

        let events = d.audit().recent_events(10);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, AuditLevel::Audit);
        assert_eq!(events[0].category, AuditCategory::Write);
        let line = serde_json::to_string(&events[0]).unwrap();
        assert!(!line.contains("hunter2"));
        assert!(!line.contains("secret"));
    }

    #[tokio::test]
    async fn test_role_denial_is_tool_error_and_consumes_no_token() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            enabled: true,
            requests_per_second: 0.001,
            burst_size: 1,
        });
        let d = dispatcher_with(AccessRole::ReadOnly, limiter);

        let resp = call(
            &d,
            1,
            "tools/call",
            json!({"name": "put_record", "arguments": {"namespace": "test", "key": "k"}}),
        )
        .await;
        let result = resp.result().unwrap();
        assert_eq!(result["isError"], true);
        assert!(
            result["content"][0]["text"]
                .as_str()
                .unwrap()
                .contains("permission denied")
        );

        let events = d.audit().recent_events(10);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].category, AuditCategory::Auth);
        assert_eq!(events[0].level, AuditLevel::Warning);

        assert!((d.rate_limiter().stats().available_tokens - 1.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_rate_limited_write_is_tool_error_with_warning() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            enabled: true,
            requests_per_second: 0.001,
            burst_size: 1,
        });
        assert!(limiter.allow());
        let d = dispatcher_with(AccessRole::ReadWrite, limiter);

        let resp = call(
            &d,
            42,
            "tools/call",
            json!({"name": "put_record", "arguments": {"namespace": "test", "key": "k", "bins": {"a": 1}}}),
        )
        .await;

        assert_eq!(resp.id, JsonRpcId::from(42));
        let result = resp.result().expect("throttling is not a protocol error");
        assert_eq!(result["isError"], true);
        assert_eq!(result["content"][0]["text"], RATE_LIMITED_MESSAGE);

        let events = d.audit().recent_events(10);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, AuditLevel::Warning);
        assert!(!events[0].success);
    }

    #[tokio::test]
    async fn test_reads_are_not_rate_limited() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            enabled: true,
            requests_per_second: 0.001,
            burst_size: 1,
        });
        assert!(limiter.allow());
        let d = dispatcher_with(AccessRole::ReadOnly, limiter);

        let resp = call(
            &d,
            1,
            "tools/call",
            json!({"name": "get_record", "arguments": {"namespace": "test", "key": "k"}}),
        )
        .await;
        assert!(resp.result().unwrap().get("isError").is_none());
    }

    #[tokio::test]
    async fn test_invalid_argument_is_invalid_params() {
        let d = dispatcher(AccessRole::ReadOnly);
        let resp = call(
            &d,
            1,
            "tools/call",
            json!({"name": "get_record", "arguments": {"namespace": "", "key": "k"}}),
        )
        .await;

        let err = resp.error().unwrap();
        assert_eq!(err.code, -32602);
        assert_eq!(err.data.as_ref().unwrap()["field"], "namespace");

        let events = d.audit().recent_events(10);
        assert_eq!(events[0].level, AuditLevel::Error);
    }

    #[tokio::test]
    async fn test_missing_tool_name_is_invalid_params() {
        let d = dispatcher(AccessRole::ReadOnly);
        let resp = call(&d, 1, "tools/call", json!({"arguments": {}})).await;
        assert_eq!(resp.error().unwrap().code, -32602);

        let resp = d
            .dispatch(&ctx(), Envelope::request(2, "tools/call", None))
            .await
            .unwrap();
        assert_eq!(resp.error().unwrap().code, -32602);
    }

    #[tokio::test]
    async fn test_downstream_failure_is_tool_error() {
        let d = dispatcher(AccessRole::ReadOnly);
        let resp = call(&d, 1, "tools/call", json!({"name": "explode", "arguments": {}})).await;
        let result = resp.result().unwrap();
        assert_eq!(result["isError"], true);
        assert_eq!(result["content"][0]["text"], "Error: backend unavailable");

        let events = d.audit().recent_events(1);
        assert_eq!(events[0].level, AuditLevel::Error);
        assert_eq!(events[0].error.as_deref(), Some("backend unavailable"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_tool_error() {
        let d = dispatcher(AccessRole::Admin);
        let resp = call(&d, 1, "tools/call", json!({"name": "scan_set", "arguments": {}})).await;
        let result = resp.result().unwrap();
        assert_eq!(result["isError"], true);
        assert_eq!(result["content"][0]["text"], "Error: unknown tool: scan_set");
    }

    #[tokio::test]
    async fn test_batch_record_count_audited() {
        let d = dispatcher(AccessRole::ReadOnly);
        call(
            &d,
            1,
            "tools/call",
            json!({"name": "get_record", "arguments": {"namespace": "test", "keys": ["a", "b", "c"]}}),
        )
        .await;
        assert_eq!(d.audit().recent_events(1)[0].record_count, Some(3));
    }

    #[tokio::test]
    async fn test_resources() {
        let d = dispatcher(AccessRole::ReadOnly);
        let list = call(&d, 1, "resources/list", json!({})).await;
        assert_eq!(list.result().unwrap()["resources"][0]["mimeType"], "application/json");

        let read = call(&d, 2, "resources/read", json!({"uri": "store://cluster/info"})).await;
        assert_eq!(read.result().unwrap()["contents"][0]["text"], "{}");

        let failed = call(&d, 3, "resources/read", json!({"uri": "store://nope"})).await;
        let result = failed.result().unwrap();
        assert_eq!(result["isError"], true);
        assert_eq!(result["contents"][0]["mimeType"], "text/plain");

        let bad = call(&d, 4, "resources/read", json!({})).await;
        assert_eq!(bad.error().unwrap().code, -32602);

        let events = d.audit().recent_events(10);
        assert_eq!(events.len(), 2);
        assert!(events[0].success);
        assert_eq!(events[1].level, AuditLevel::Error);
    }

    #[tokio::test]
    async fn test_numeric_ids_are_echoed_verbatim() {
        let d = dispatcher(AccessRole::ReadOnly);
        for raw in ["18446744073709551615", "1.5", "1.0"] {
            let frame = format!(r#"{{"version":"2.0","id":{raw},"method":"ping"}}"#);
            let out = d.handle_bytes(&ctx(), frame.as_bytes()).await.unwrap();
            assert_eq!(
                String::from_utf8(out).unwrap(),
                format!(r#"{{"version":"2.0","id":{raw},"result":{{}}}}"#)
            );
        }
    }

    #[tokio::test]
    async fn test_initialize_with_null_params_completes_handshake() {
        let d = dispatcher(AccessRole::ReadOnly);
        let out = d
            .handle_bytes(
                &ctx(),
                br#"{"version":"2.0","id":1,"method":"initialize","params":null}"#,
            )
            .await
            .unwrap();
        let value: Value = serde_json::from_slice(&out).unwrap();
        assert!(value.get("error").is_none(), "{value}");
        assert_eq!(value["result"]["protocolVersion"], PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn test_handshake_only_names_the_callers_session() {
        let registry = SessionRegistry::new(TransportKind::Sse, 10, OverflowPolicy::DropNewest);
        let caller = registry.create();
        let bystander = registry.create();
        let d = dispatcher(AccessRole::ReadOnly);

        d.dispatch(
            &RequestContext::for_session(&caller),
            Envelope::request(1, "initialize", Some(json!({"clientInfo": {"name": "agent"}}))),
        )
        .await
        .unwrap();
        d.dispatch(
            &ctx(),
            Envelope::request(2, "initialize", Some(json!({"clientInfo": {"name": "detached"}}))),
        )
        .await
        .unwrap();

        assert_eq!(caller.client_name().as_deref(), Some("agent"));
        assert_eq!(bystander.client_name(), None);
    }

    #[tokio::test]
    async fn test_lifecycle_and_catalog_methods_are_not_audited() {
        let d = dispatcher(AccessRole::Admin);
        for (id, method) in [
            "initialize",
            "ping",
            "shutdown",
            "tools/list",
            "resources/list",
            "prompts/list",
        ]
        .into_iter()
        .enumerate()
        {
            let resp = call(&d, id as i64, method, json!({})).await;
            assert!(resp.error().is_none(), "{method}");
        }
        assert!(d.audit().recent_events(10).is_empty());

        call(&d, 10, "resources/read", json!({"uri": "store://cluster/info"})).await;
        assert_eq!(d.audit().recent_events(10).len(), 1);
    }
}
