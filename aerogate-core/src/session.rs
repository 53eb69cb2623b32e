//! Session registry and per-session outbound queues.
//!
//! Each HTTP transport constructs its own [`SessionRegistry`]; sessions are
//! never shared across transport kinds. The registry is the only owner of
//! session state. Adapters hold ids and short-lived `Arc<Session>` handles.
//!
//! Outbound queues are bounded and never block producers. What happens on
//! overflow is a per-registry [`OverflowPolicy`]:
//! - push-stream keeps what is already queued and drops the new message,
//! - polling evicts the oldest queued message to admit the new one.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Which transport a session (or the whole process) is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Newline-delimited frames on stdin/stdout.
    Stdio,
    /// Server-sent events plus a submission endpoint.
    Sse,
    /// HTTP long-polling simulation of a duplex channel.
    #[serde(alias = "websocket")]
    Polling,
}

impl TransportKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            TransportKind::Stdio => "stdio",
            TransportKind::Sse => "sse",
            TransportKind::Polling => "polling",
        }
    }

    pub const fn is_http(self) -> bool {
        matches!(self, TransportKind::Sse | TransportKind::Polling)
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stdio" => Ok(TransportKind::Stdio),
            "sse" => Ok(TransportKind::Sse),
            "polling" | "websocket" => Ok(TransportKind::Polling),
            other => Err(format!(
                "invalid transport '{other}' (must be stdio, sse, or polling)"
            )),
        }
    }
}

/// Opaque session token (a random UUID).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a token received from a client. `None` if it is not one of ours.
    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw.trim()).ok().map(Self)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outbound queue
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Keep queued messages; discard the incoming one.
    DropNewest,
    /// Discard the oldest queued message; keep the incoming one.
    EvictOldest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Enqueued,
    /// Queue was full; the pushed message was discarded.
    DroppedNewest,
    /// Queue was full; the oldest message was discarded to make room.
    EvictedOldest,
    /// The session is gone.
    Closed,
}

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<String>,
    closed: bool,
}

/// Bounded FIFO of serialized responses.
#[derive(Debug)]
pub struct OutboundQueue {
    capacity: usize,
    policy: OverflowPolicy,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl OutboundQueue {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            capacity: capacity.max(1),
            policy,
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        }
    }

    /// Enqueue without blocking, applying the overflow policy when full.
    pub fn push(&self, message: String) -> PushOutcome {
        let outcome = {
            let mut state = self.state.lock();
            if state.closed {
                return PushOutcome::Closed;
            }
            if state.items.len() < self.capacity {
                state.items.push_back(message);
                PushOutcome::Enqueued
            } else {
                match self.policy {
                    OverflowPolicy::DropNewest => return PushOutcome::DroppedNewest,
                    OverflowPolicy::EvictOldest => {
                        state.items.pop_front();
                        state.items.push_back(message);
                        PushOutcome::EvictedOldest
                    }
                }
            }
        };
        self.notify.notify_waiters();
        outcome
    }

    pub fn try_recv(&self) -> Option<String> {
        self.state.lock().items.pop_front()
    }

    /// Wait for the next message. `None` once the queue is closed and drained.
    pub async fn recv(&self) -> Option<String> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if let Some(message) = state.items.pop_front() {
                    return Some(message);
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Reject further pushes and wake every waiter.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Session {
    id: SessionId,
    transport: TransportKind,
    queue: OutboundQueue,
    last_activity: Mutex<Instant>,
    client_name: Mutex<Option<String>>,
}

impl Session {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    pub fn queue(&self) -> &OutboundQueue {
        &self.queue
    }

    /// Record activity (connect, send, receive).
    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(*self.last_activity.lock())
    }

    /// Client name announced in the handshake, if any.
    pub fn client_name(&self) -> Option<String> {
        self.client_name.lock().clone()
    }

    pub fn set_client_name(&self, name: impl Into<String>) {
        *self.client_name.lock() = Some(name.into());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Single source of truth for live sessions of one transport.
#[derive(Debug)]
pub struct SessionRegistry {
    transport: TransportKind,
    queue_capacity: usize,
    policy: OverflowPolicy,
    sessions: Mutex<HashMap<SessionId, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new(transport: TransportKind, queue_capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            transport,
            queue_capacity,
            policy,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    /// Allocate and register a new session.
    pub fn create(&self) -> Arc<Session> {
        let now = Instant::now();
        let session = Arc::new(Session {
            id: SessionId::new(),
            transport: self.transport,
            queue: OutboundQueue::new(self.queue_capacity, self.policy),
            last_activity: Mutex::new(now),
            client_name: Mutex::new(None),
        });
        self.sessions.lock().insert(session.id, Arc::clone(&session));
        session
    }

    pub fn lookup(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.lock().get(id).cloned()
    }

    /// Deregister a session and close its queue. Returns whether it existed.
    pub fn delete(&self, id: &SessionId) -> bool {
        let removed = self.sessions.lock().remove(id);
        match removed {
            Some(session) => {
                session.queue.close();
                true
            }
            None => false,
        }
    }

    /// Remove sessions idle for longer than `idle`. Returns the evicted ids.
    pub fn sweep(&self, idle: Duration) -> Vec<SessionId> {
        let now = Instant::now();
        let evicted: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.lock();
            let stale: Vec<SessionId> = sessions
                .values()
                .filter(|s| s.idle_for(now) > idle)
                .map(|s| s.id)
                .collect();
            stale
                .iter()
                .filter_map(|id| sessions.remove(id))
                .collect()
        };

        evicted
            .into_iter()
            .map(|session| {
                session.queue.close();
                session.id
            })
            .collect()
    }

    /// Close and drop every session (process shutdown).
    pub fn close_all(&self) {
        let drained: Vec<Arc<Session>> = self.sessions.lock().drain().map(|(_, s)| s).collect();
        for session in drained {
            session.queue.close();
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
