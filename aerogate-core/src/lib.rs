//! aerogate core: the transport-agnostic protocol engine.
//!
//! This library holds everything the three transports share: the envelope
//! codec, the closed method table, the dispatcher pipeline (authorization,
//! rate limiting, validation, invocation, audit), the session registry and
//! the boundary to the external capability registry.
//!
//! Transport adapters live in `aerogate-http` (push-stream and polling) and
//! in the `aerogate` binary crate (unary stdio stream).

pub mod audit;
pub mod capability;
pub mod catalog;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod health;
pub mod jsonrpc;
pub mod protocol;
pub mod rate_limiter;
pub mod session;
pub mod validator;

pub use dispatcher::{Dispatcher, RequestContext};
pub use jsonrpc::{Envelope, JsonRpcId, Response};
pub use session::{SessionId, SessionRegistry, TransportKind};

/// Server identity reported by the handshake and health surfaces.
pub const SERVER_NAME: &str = "aerogate";

/// Server version reported by the handshake and health surfaces.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
