//! Push-stream transport (server-sent events).
//!
//! `GET /sse` opens a stream and registers a session. The first event,
//! `endpoint`, carries the URL to post requests to. Each response produced by
//! a post is queued on the session and delivered as a `message` event. The
//! session is deregistered when the stream is dropped (client disconnect) or
//! ends (shutdown).

use std::convert::Infallible;
use std::sync::Arc;

use aerogate_core::{RequestContext, SessionId, SessionRegistry};
use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use serde::Deserialize;
use tracing::{debug, info};

use crate::health::health_handler;
use crate::state::{TransportState, enqueue};

pub const ENDPOINT_EVENT: &str = "endpoint";
pub const MESSAGE_EVENT: &str = "message";

pub fn router(state: TransportState) -> Router {
    Router::new()
        .route("/sse", get(stream_handler))
        .route("/message", post(message_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Removes the session from its registry when the event stream goes away.
struct SessionGuard {
    sessions: Arc<SessionRegistry>,
    id: SessionId,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.sessions.delete(&self.id) {
            info!(session_id = %self.id, "Event stream closed");
        }
    }
}

async fn stream_handler(State(state): State<TransportState>) -> Response {
    if state.shutdown.is_cancelled() {
        return (StatusCode::SERVICE_UNAVAILABLE, "server is shutting down").into_response();
    }

    let session = state.sessions.create();
    let id = session.id();
    info!(session_id = %id, sessions = state.sessions.len(), "Event stream opened");

    let endpoint = Event::default()
        .event(ENDPOINT_EVENT)
        .data(format!("/message?sessionId={id}"));
    let guard = SessionGuard {
        sessions: Arc::clone(&state.sessions),
        id,
    };

    let messages = stream::unfold(
        (session, guard, state.shutdown.clone()),
        |(session, guard, shutdown)| async move {
            let next = tokio::select! {
                _ = shutdown.cancelled() => None,
                message = session.queue().recv() => message,
            };
            next.map(|message| {
                let event = Event::default().event(MESSAGE_EVENT).data(message);
                (Ok::<_, Infallible>(event), (session, guard, shutdown))
            })
        },
    );

    let events = stream::once(async move { Ok::<_, Infallible>(endpoint) }).chain(messages);
    Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response()
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

async fn message_handler(
    State(state): State<TransportState>,
    Query(query): Query<MessageQuery>,
    body: Bytes,
) -> Response {
    if state.shutdown.is_cancelled() {
        return (StatusCode::SERVICE_UNAVAILABLE, "server is shutting down").into_response();
    }

    let Some(raw) = query.session_id.filter(|s| !s.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "missing sessionId").into_response();
    };
    let Some(session) = SessionId::parse(&raw).and_then(|id| state.sessions.lookup(&id)) else {
        debug!(session_id = %raw, "Post for unknown session");
        return (StatusCode::NOT_FOUND, "session not found").into_response();
    };

    session.touch();
    let ctx = RequestContext::for_session(&session);
    if let Some(bytes) = state.dispatcher.handle_bytes(&ctx, &body).await {
        enqueue(&session, bytes);
    }

    (StatusCode::ACCEPTED, "Accepted").into_response()
}
