//! Audit trail.
//!
//! Every pipeline-relevant outcome becomes one JSON line on the configured
//! sink (append-mode file or stderr) and is kept in a fixed-size ring for
//! introspection. Logging is synchronous under one lock. Sink failures are
//! reported through `tracing` and otherwise swallowed: the audited operation
//! has already happened and must not fail because its record could not be
//! written.

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::config::AuditConfig;
use crate::protocol::OperationCategory;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("opening audit log file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditLevel {
    Info,
    Warning,
    Error,
    /// Successful state change.
    Audit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditCategory {
    Read,
    Write,
    Admin,
    Auth,
    System,
}

impl From<OperationCategory> for AuditCategory {
    fn from(category: OperationCategory) -> Self {
        match category {
            OperationCategory::Read => AuditCategory::Read,
            OperationCategory::Write => AuditCategory::Write,
            OperationCategory::Admin => AuditCategory::Admin,
        }
    }
}

/// One audit record.
///
/// Carries identifiers only (namespace, set, key). Written bin values never
/// appear here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Stamped by [`AuditLog::log`] when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    pub level: AuditLevel,
    pub category: AuditCategory,
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub duration_ns: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub details: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_count: Option<usize>,
}

impl AuditEvent {
    /// A successful event with no subject and zero duration.
    pub fn new(level: AuditLevel, category: AuditCategory, operation: impl Into<String>) -> Self {
        Self {
            timestamp: None,
            level,
            category,
            operation: operation.into(),
            namespace: None,
            set: None,
            key: None,
            user: None,
            client_id: None,
            duration_ns: 0,
            success: true,
            error: None,
            details: Map::new(),
            record_count: None,
        }
    }

    pub fn with_subject(
        mut self,
        namespace: Option<String>,
        set: Option<String>,
        key: Option<String>,
    ) -> Self {
        self.namespace = namespace;
        self.set = set;
        self.key = key;
        self
    }

    pub fn with_caller(mut self, user: Option<String>, client_id: Option<String>) -> Self {
        self.user = user;
        self.client_id = client_id;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ns = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self
    }

    /// Mark the event failed with `error`.
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn with_record_count(mut self, count: usize) -> Self {
        self.record_count = Some(count);
        self
    }
}

struct Inner {
    sink: Box<dyn Write + Send>,
    ring: VecDeque<AuditEvent>,
}

pub struct AuditLog {
    enabled: bool,
    capacity: usize,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("enabled", &self.enabled)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl AuditLog {
    /// Open the configured sink.
    ///
    /// # Errors
    ///
    /// [`AuditError::Open`] if the file cannot be opened for appending.
    pub fn new(config: &AuditConfig) -> Result<Self, AuditError> {
        let sink: Box<dyn Write + Send> = match &config.file_path {
            Some(path) if config.enabled => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|source| AuditError::Open {
                        path: path.clone(),
                        source,
                    })?;
                Box::new(file)
            }
            _ => Box::new(std::io::stderr()),
        };
        Ok(Self::with_writer(config, sink))
    }

    /// Use an arbitrary writer as the sink.
    pub fn with_writer(config: &AuditConfig, sink: Box<dyn Write + Send>) -> Self {
        let capacity = config.buffer_size.max(1);
        Self {
            enabled: config.enabled,
            capacity,
            inner: Mutex::new(Inner {
                sink,
                ring: VecDeque::with_capacity(capacity),
            }),
        }
    }

    /// A logger that records nothing.
    pub fn disabled() -> Self {
        Self::with_writer(
            &AuditConfig {
                enabled: false,
                ..Default::default()
            },
            Box::new(std::io::sink()),
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record an event.
    pub fn log(&self, mut event: AuditEvent) {
        if !self.enabled {
            return;
        }
        if event.timestamp.is_none() {
            event.timestamp = Some(Utc::now());
        }

        let mut inner = self.inner.lock();

        match serde_json::to_vec(&event) {
            Ok(mut line) => {
                line.push(b'\n');
                if let Err(e) = inner.sink.write_all(&line) {
                    warn!(error = %e, operation = %event.operation, "Failed to write audit event");
                }
            }
            Err(e) => {
                warn!(error = %e, operation = %event.operation, "Failed to serialize audit event");
            }
        }

        if inner.ring.len() == self.capacity {
            inner.ring.pop_front();
        }
        inner.ring.push_back(event);
    }

    /// The last `count` events, oldest first.
    pub fn recent_events(&self, count: usize) -> Vec<AuditEvent> {
        let inner = self.inner.lock();
        let skip = inner.ring.len().saturating_sub(count);
        inner.ring.iter().skip(skip).cloned().collect()
    }

    pub fn flush(&self) {
        let mut inner = self.inner.lock();
        if let Err(e) = inner.sink.flush() {
            warn!(error = %e, "Failed to flush audit log");
        }
    }
}
