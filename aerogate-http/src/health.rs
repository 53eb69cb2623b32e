//! `GET /health`, mounted by both HTTP transports.

use aerogate_core::health::HealthReport;
use axum::Json;
use axum::extract::State;

use crate::state::TransportState;

pub async fn health_handler(State(state): State<TransportState>) -> Json<HealthReport> {
    Json(HealthReport::healthy(state.transport(), state.sessions.len()))
}
