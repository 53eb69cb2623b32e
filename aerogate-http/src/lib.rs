//! HTTP transports for the aerogate gateway.
//!
//! Two adapters share one [`Dispatcher`](aerogate_core::Dispatcher):
//!
//! - [`sse`]: a long-lived server-sent-event stream per session, with
//!   submissions posted to a per-session URL announced on connect.
//! - [`polling`]: a simulated duplex channel built from a connect call, a
//!   send call and a blocking receive call.
//!
//! Each adapter owns its own [`SessionRegistry`](aerogate_core::SessionRegistry)
//! through a [`TransportState`]. Sessions are never shared across transports.

pub mod error;
pub mod health;
pub mod polling;
pub mod server;
pub mod sse;
mod state;

pub use error::ServeError;
pub use server::{bind_address, router, serve, serve_listener};
pub use state::TransportState;

#[cfg(test)]
mod tests_support {
    use std::sync::Arc;

    use aerogate_core::Dispatcher;
    use aerogate_core::audit::AuditLog;
    use aerogate_core::catalog::MemoryCatalog;
    use aerogate_core::protocol::AccessRole;
    use aerogate_core::rate_limiter::RateLimiter;
    use aerogate_core::validator::Validator;

    pub(crate) fn dispatcher() -> Dispatcher {
        Dispatcher::new(
            Arc::new(MemoryCatalog::default()),
            AccessRole::ReadWrite,
            Arc::new(RateLimiter::disabled()),
            Arc::new(AuditLog::disabled()),
            Validator::default(),
        )
    }
}
