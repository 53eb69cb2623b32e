use std::sync::Arc;
use std::time::Duration;

use aerogate_core::config::SessionConfig;
use aerogate_core::session::{OverflowPolicy, PushOutcome, Session};
use aerogate_core::{Dispatcher, SessionRegistry, TransportKind};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Shared state of one HTTP transport: its dispatcher handle, its own session
/// registry and the process shutdown signal.
#[derive(Clone)]
pub struct TransportState {
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) sessions: Arc<SessionRegistry>,
    pub(crate) shutdown: CancellationToken,
    pub(crate) settings: SessionConfig,
}

impl TransportState {
    /// Build the state for `transport` with a fresh registry.
    ///
    /// The push stream keeps what is already queued when a session's queue is
    /// full (newest message dropped). The polling transport favours recency
    /// and evicts the oldest queued message instead.
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        transport: TransportKind,
        settings: SessionConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let policy = match transport {
            TransportKind::Polling => OverflowPolicy::EvictOldest,
            TransportKind::Sse | TransportKind::Stdio => OverflowPolicy::DropNewest,
        };
        let sessions = Arc::new(SessionRegistry::new(
            transport,
            settings.queue_capacity,
            policy,
        ));
        Self {
            dispatcher,
            sessions,
            shutdown,
            settings,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn transport(&self) -> TransportKind {
        self.sessions.transport()
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub(crate) fn receive_timeout(&self) -> Duration {
        self.settings.receive_timeout()
    }
}

/// Queue a dispatch result for later delivery. Never blocks.
pub(crate) fn enqueue(session: &Session, bytes: Vec<u8>) {
    let message = match String::from_utf8(bytes) {
        Ok(message) => message,
        Err(e) => {
            error!(session_id = %session.id(), error = %e, "Response is not UTF-8, not queued");
            return;
        }
    };

    match session.queue().push(message) {
        PushOutcome::Enqueued => {}
        PushOutcome::DroppedNewest => warn!(
            session_id = %session.id(),
            capacity = session.queue().capacity(),
            "Outbound queue full, response dropped"
        ),
        PushOutcome::EvictedOldest => warn!(
            session_id = %session.id(),
            capacity = session.queue().capacity(),
            "Outbound queue full, oldest message evicted"
        ),
        PushOutcome::Closed => {
            debug!(session_id = %session.id(), "Session closed before response was queued");
        }
    }
}
