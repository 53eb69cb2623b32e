//! The closed method table.

/// Every method the dispatcher understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Lifecycle handshake.
    Initialize,
    /// Client acknowledgement of the handshake (notification).
    Initialized,
    /// Liveness round-trip.
    Ping,
    /// Client-initiated orderly close.
    Shutdown,
    /// List invocable capabilities.
    ListCapabilities,
    /// Invoke a capability by name.
    CallCapability,
    /// List read-only named resources.
    ListResources,
    /// Read a named resource.
    ReadResource,
    /// List prompt templates (always empty).
    ListPrompts,
}

/// How the pipeline treats a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    /// Handshake and housekeeping; never audited.
    Lifecycle,
    /// Answered from the registry's descriptors; never audited.
    Catalog,
    /// Goes through authorization, rate limiting, validation and audit.
    Invocation,
    /// Audited as a read.
    ResourceRead,
}

impl Method {
    /// Look up a wire method name.
    ///
    /// Both the capability-oriented names and the MCP tool names are accepted.
    pub fn from_name(name: &str) -> Option<Self> {
        let method = match name {
            "initialize" => Method::Initialize,
            "notifications/initialized" | "initialized" => Method::Initialized,
            "ping" => Method::Ping,
            "shutdown" => Method::Shutdown,
            "capabilities/list" | "tools/list" => Method::ListCapabilities,
            "capabilities/call" | "tools/call" => Method::CallCapability,
            "resources/list" => Method::ListResources,
            "resources/read" => Method::ReadResource,
            "prompts/list" => Method::ListPrompts,
            _ => return None,
        };
        Some(method)
    }

    /// Canonical wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Method::Initialize => "initialize",
            Method::Initialized => "notifications/initialized",
            Method::Ping => "ping",
            Method::Shutdown => "shutdown",
            Method::ListCapabilities => "capabilities/list",
            Method::CallCapability => "capabilities/call",
            Method::ListResources => "resources/list",
            Method::ReadResource => "resources/read",
            Method::ListPrompts => "prompts/list",
        }
    }

    pub const fn kind(self) -> MethodKind {
        match self {
            Method::Initialize | Method::Initialized | Method::Ping | Method::Shutdown => {
                MethodKind::Lifecycle
            }
            Method::ListCapabilities | Method::ListResources | Method::ListPrompts => {
                MethodKind::Catalog
            }
            Method::CallCapability => MethodKind::Invocation,
            Method::ReadResource => MethodKind::ResourceRead,
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
