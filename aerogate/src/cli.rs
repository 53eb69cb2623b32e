//! Command-line interface.
//!
//! Flags are the last configuration layer: file, then `AEROGATE_*`
//! environment overrides, then these.

use std::path::PathBuf;

use aerogate_core::TransportKind;
use aerogate_core::config::{self, ConfigError, GatewayConfig};
use aerogate_core::protocol::AccessRole;
use clap::{Parser, ValueEnum};

/// aerogate: a tool gateway over stdio, SSE and long-polling.
#[derive(Parser, Debug)]
#[command(name = "aerogate", version)]
pub struct Cli {
    /// Configuration file (YAML). Searched for when omitted.
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Transport to serve.
    #[arg(long, value_enum)]
    pub transport: Option<CliTransport>,

    /// Listen address for HTTP transports.
    #[arg(long)]
    pub bind: Option<String>,

    /// Listen port for HTTP transports.
    #[arg(long)]
    pub port: Option<u16>,

    /// Access role granted to every caller.
    #[arg(long, value_enum)]
    pub role: Option<CliRole>,

    /// Enable debug logging.
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliTransport {
    Stdio,
    Sse,
    #[value(alias = "websocket")]
    Polling,
}

impl From<CliTransport> for TransportKind {
    fn from(t: CliTransport) -> Self {
        match t {
            CliTransport::Stdio => TransportKind::Stdio,
            CliTransport::Sse => TransportKind::Sse,
            CliTransport::Polling => TransportKind::Polling,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliRole {
    ReadOnly,
    ReadWrite,
    Admin,
}

impl From<CliRole> for AccessRole {
    fn from(r: CliRole) -> Self {
        match r {
            CliRole::ReadOnly => AccessRole::ReadOnly,
            CliRole::ReadWrite => AccessRole::ReadWrite,
            CliRole::Admin => AccessRole::Admin,
        }
    }
}

impl Cli {
    /// Overlay explicitly given flags onto `config`.
    pub fn apply(&self, config: &mut GatewayConfig) {
        if let Some(transport) = self.transport {
            config.transport = transport.into();
        }
        if let Some(bind) = &self.bind {
            config.bind = bind.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(role) = self.role {
            config.role = role.into();
        }
    }

    /// Load, overlay and validate the effective configuration.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`] from loading, or a validation failure introduced by
    /// the flags themselves.
    pub fn resolve_config(&self) -> Result<GatewayConfig, ConfigError> {
        let mut config = config::load(self.config.as_deref())?;
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }
}
