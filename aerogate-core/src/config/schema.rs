//! Configuration schema.
//!
//! Every section has built-in defaults, so an empty mapping (or no file at
//! all) yields a runnable stdio gateway.
//!
//! # Example
//! ```yaml
//! transport: sse
//! port: 8080
//! role: read-write
//!
//! audit:
//!   file_path: /var/log/aerogate/audit.jsonl
//!
//! rate_limit:
//!   requests_per_second: 50
//!   burst_size: 100
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use crate::protocol::AccessRole;
use crate::session::TransportKind;

// ─────────────────────────────────────────────────────────────────────────────
// Top level
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub transport: TransportKind,

    /// Listen address for the HTTP transports.
    pub bind: String,

    /// Listen port for the HTTP transports.
    pub port: u16,

    pub role: AccessRole,

    /// How long open streams may take to close once shutdown starts.
    pub shutdown_grace_secs: u64,

    pub audit: AuditConfig,
    pub rate_limit: RateLimitConfig,
    pub validator: ValidatorConfig,
    pub session: SessionConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Stdio,
            bind: "0.0.0.0".to_string(),
            port: 8080,
            role: AccessRole::ReadOnly,
            shutdown_grace_secs: 5,
            audit: AuditConfig::default(),
            rate_limit: RateLimitConfig::default(),
            validator: ValidatorConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl GatewayConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Check cross-field invariants.
    ///
    /// # Errors
    ///
    /// The first violated rule, as a [`ConfigError`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transport.is_http() && self.port == 0 {
            return Err(ConfigError::InvalidPort {
                transport: self.transport.to_string(),
            });
        }
        if self.transport.is_http() && self.bind.trim().is_empty() {
            return Err(ConfigError::invalid("bind", "cannot be empty"));
        }

        if self.rate_limit.enabled {
            let rps = self.rate_limit.requests_per_second;
            if rps.is_nan() || rps <= 0.0 {
                return Err(ConfigError::invalid(
                    "rate_limit.requests_per_second",
                    "must be positive when rate limiting is enabled",
                ));
            }
            if self.rate_limit.burst_size <= 0 {
                return Err(ConfigError::invalid(
                    "rate_limit.burst_size",
                    "must be positive when rate limiting is enabled",
                ));
            }
        }

        if self.audit.buffer_size == 0 {
            return Err(ConfigError::invalid("audit.buffer_size", "must be positive"));
        }

        let v = &self.validator;
        for (field, value) in [
            ("validator.max_key_length", v.max_key_length),
            ("validator.max_bin_name_length", v.max_bin_name_length),
            ("validator.max_namespace_length", v.max_namespace_length),
            ("validator.max_set_name_length", v.max_set_name_length),
            ("validator.max_batch_size", v.max_batch_size),
            ("validator.max_record_size", v.max_record_size),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(field, "must be positive"));
            }
        }

        let s = &self.session;
        if s.queue_capacity == 0 {
            return Err(ConfigError::invalid("session.queue_capacity", "must be positive"));
        }
        for (field, value) in [
            ("session.receive_timeout_secs", s.receive_timeout_secs),
            ("session.idle_timeout_secs", s.idle_timeout_secs),
            ("session.sweep_interval_secs", s.sweep_interval_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(field, "must be positive"));
            }
        }
        if s.receive_timeout_secs >= s.idle_timeout_secs {
            return Err(ConfigError::ReceiveTimeoutNotBelowIdle {
                receive: s.receive_timeout_secs,
                idle: s.idle_timeout_secs,
            });
        }

        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────────────

/// Audit trail sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,

    /// JSON-lines file opened in append mode. Standard error when unset.
    pub file_path: Option<PathBuf>,

    /// Events kept in memory for introspection.
    pub buffer_size: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            file_path: None,
            buffer_size: 100,
        }
    }
}

/// Token bucket applied to mutating invocations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_second: f64,
    pub burst_size: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_second: 100.0,
            burst_size: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub max_key_length: usize,
    pub max_bin_name_length: usize,
    pub max_namespace_length: usize,
    pub max_set_name_length: usize,
    pub max_batch_size: usize,
    pub max_record_size: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_key_length: 1024,
            max_bin_name_length: 15,
            max_namespace_length: 31,
            max_set_name_length: 63,
            max_batch_size: 5000,
            max_record_size: 1024 * 1024,
        }
    }
}

/// Queue and timing knobs for the HTTP transports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub queue_capacity: usize,
    pub receive_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            receive_timeout_secs: 30,
            idle_timeout_secs: 300,
            sweep_interval_secs: 60,
        }
    }
}

impl SessionConfig {
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_secs(self.receive_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.transport, TransportKind::Stdio);
        assert_eq!(config.bind, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.role, AccessRole::ReadOnly);
        assert!(config.audit.enabled);
        assert_eq!(config.audit.buffer_size, 100);
        assert_eq!(config.rate_limit.requests_per_second, 100.0);
        assert_eq!(config.rate_limit.burst_size, 200);
        assert_eq!(config.validator.max_bin_name_length, 15);
        assert_eq!(config.validator.max_record_size, 1_048_576);
        assert_eq!(config.session.receive_timeout(), Duration::from_secs(30));
        assert_eq!(config.session.idle_timeout(), Duration::from_secs(300));
        assert_eq!(config.shutdown_grace(), Duration::from_secs(5));
    }

    #[test]
    fn test_defaults_validate_ok() {
        assert!(GatewayConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_port_rejected_for_http_only() {
        let config = GatewayConfig {
            port: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let config = GatewayConfig {
            transport: TransportKind::Sse,
            port: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPort { .. })
        ));
    }

    #[test]
    fn test_rate_limit_checked_only_when_enabled() {
        let mut config = GatewayConfig::default();
        config.rate_limit.burst_size = 0;
        assert!(config.validate().is_err());

        config.rate_limit.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_receive_timeout_must_be_below_idle() {
        let mut config = GatewayConfig::default();
        config.session.receive_timeout_secs = 300;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ReceiveTimeoutNotBelowIdle { .. })
        ));
    }

    #[test]
    fn test_zero_limits_rejected() {
        let mut config = GatewayConfig::default();
        config.validator.max_batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.session.queue_capacity = 0;
        assert!(config.validate().is_err());
    }
}
