//! Shared fixtures for the HTTP transport tests.

#![allow(dead_code)]

use std::sync::Arc;

use aerogate_core::audit::AuditLog;
use aerogate_core::catalog::MemoryCatalog;
use aerogate_core::config::SessionConfig;
use aerogate_core::protocol::AccessRole;
use aerogate_core::rate_limiter::RateLimiter;
use aerogate_core::validator::Validator;
use aerogate_core::{Dispatcher, TransportKind};
use aerogate_http::TransportState;
use axum::body::Body;
use axum::http::{Request, Response};
use http_body_util::BodyExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

pub fn state(transport: TransportKind, queue_capacity: usize) -> TransportState {
    let dispatcher = Dispatcher::new(
        Arc::new(MemoryCatalog::default()),
        AccessRole::ReadWrite,
        Arc::new(RateLimiter::disabled()),
        Arc::new(AuditLog::disabled()),
        Validator::default(),
    );
    TransportState::new(
        Arc::new(dispatcher),
        transport,
        SessionConfig {
            queue_capacity,
            ..SessionConfig::default()
        },
        CancellationToken::new(),
    )
}

pub fn ping(id: i64) -> String {
    format!(r#"{{"version":"2.0","id":{id},"method":"ping"}}"#)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}
