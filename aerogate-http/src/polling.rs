//! Long-polling transport.
//!
//! A simulated duplex channel over three plain HTTP calls:
//!
//! - `GET /ws` registers a session and returns its id as `client_id`.
//! - `POST /ws/send` dispatches one frame. The response is returned directly
//!   and also queued for `receive`.
//! - `GET /ws/receive` waits up to the receive timeout for the next queued
//!   message and answers `{"status":"no_messages"}` when none arrives.
//!
//! The session id travels in the `X-Session-ID` header (`X-Client-ID` is
//! accepted too). Sessions idle longer than the idle threshold are removed
//! by [`spawn_sweeper`].

use std::sync::Arc;
use std::time::Duration;

use aerogate_core::session::Session;
use aerogate_core::{RequestContext, SessionId, SessionRegistry};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde::Serialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::health::health_handler;
use crate::state::{TransportState, enqueue};

pub const SESSION_HEADER: &str = "x-session-id";
pub const SESSION_HEADER_ALIAS: &str = "x-client-id";

pub fn router(state: TransportState) -> Router {
    Router::new()
        .route("/ws", get(connect_handler))
        .route("/ws/send", post(send_handler))
        .route("/ws/receive", get(receive_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ConnectResponse {
    client_id: String,
    status: &'static str,
    message: &'static str,
}

async fn connect_handler(State(state): State<TransportState>) -> Response {
    if state.shutdown.is_cancelled() {
        return (StatusCode::SERVICE_UNAVAILABLE, "server is shutting down").into_response();
    }

    let session = state.sessions.create();
    info!(session_id = %session.id(), sessions = state.sessions.len(), "Polling session opened");

    Json(ConnectResponse {
        client_id: session.id().to_string(),
        status: "connected",
        message: "POST /ws/send to send, GET /ws/receive to receive",
    })
    .into_response()
}

async fn send_handler(
    State(state): State<TransportState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if state.shutdown.is_cancelled() {
        return (StatusCode::SERVICE_UNAVAILABLE, "server is shutting down").into_response();
    }
    let session = match session_from_headers(&state, &headers) {
        Ok(session) => session,
        Err(rejection) => return rejection,
    };

    session.touch();
    let ctx = RequestContext::for_session(&session);
    match state.dispatcher.handle_bytes(&ctx, &body).await {
        Some(bytes) => {
            enqueue(&session, bytes.clone());
            json_body(bytes)
        }
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn receive_handler(State(state): State<TransportState>, headers: HeaderMap) -> Response {
    let session = match session_from_headers(&state, &headers) {
        Ok(session) => session,
        Err(rejection) => return rejection,
    };

    session.touch();
    let received = tokio::select! {
        _ = state.shutdown.cancelled() => Received::Nothing,
        waited = tokio::time::timeout(state.receive_timeout(), session.queue().recv()) => {
            match waited {
                Ok(Some(message)) => Received::Message(message),
                Ok(None) => Received::Closed,
                Err(_) => Received::Nothing,
            }
        }
    };
    session.touch();

    match received {
        Received::Message(message) => json_body(message.into_bytes()),
        Received::Nothing => Json(json!({"status": "no_messages"})).into_response(),
        Received::Closed => {
            debug!(session_id = %session.id(), "Session closed while waiting");
            (StatusCode::NOT_FOUND, "session not found").into_response()
        }
    }
}

enum Received {
    Message(String),
    /// Timed out or shutting down.
    Nothing,
    /// The session was removed while waiting.
    Closed,
}

#[allow(clippy::result_large_err)]
fn session_from_headers(
    state: &TransportState,
    headers: &HeaderMap,
) -> Result<Arc<Session>, Response> {
    let raw = headers
        .get(SESSION_HEADER)
        .or_else(|| headers.get(SESSION_HEADER_ALIAS))
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            (StatusCode::BAD_REQUEST, "missing X-Session-ID header").into_response()
        })?;

    SessionId::parse(raw)
        .and_then(|id| state.sessions.lookup(&id))
        .ok_or_else(|| {
            debug!(session_id = %raw, "Request for unknown session");
            (StatusCode::NOT_FOUND, "session not found").into_response()
        })
}

fn json_body(bytes: Vec<u8>) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], bytes).into_response()
}

// ─────────────────────────────────────────────────────────────────────────────
// Idle sweep
// ─────────────────────────────────────────────────────────────────────────────

/// Periodically remove sessions with no connect/send/receive activity for
/// longer than `idle`. Stops when `shutdown` is cancelled.
pub fn spawn_sweeper(
    sessions: Arc<SessionRegistry>,
    every: Duration,
    idle: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let evicted = sessions.sweep(idle);
                    if evicted.is_empty() {
                        continue;
                    }
                    for id in &evicted {
                        debug!(session_id = %id, "Idle session evicted");
                    }
                    info!(
                        evicted = evicted.len(),
                        remaining = sessions.len(),
                        "Idle polling sessions swept"
                    );
                }
            }
        }
        debug!("Session sweeper stopped");
    })
}
