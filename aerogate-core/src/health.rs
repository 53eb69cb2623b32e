//! Health report shared by every transport.

use serde::{Deserialize, Serialize};

use crate::protocol::PROTOCOL_VERSION;
use crate::session::TransportKind;
use crate::{SERVER_NAME, SERVER_VERSION};

/// Body of the health surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub server: String,
    pub version: String,
    pub protocol_version: String,
    pub transport: TransportKind,
    /// Live sessions in this transport's registry.
    pub sessions: usize,
}

impl HealthReport {
    #[must_use]
    pub fn healthy(transport: TransportKind, sessions: usize) -> Self {
        Self {
            status: "healthy".to_string(),
            server: SERVER_NAME.to_string(),
            version: SERVER_VERSION.to_string(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            transport,
            sessions,
        }
    }
}
