//! Error types for the stdio transport and process bootstrap.

use aerogate_core::audit::AuditError;
use aerogate_core::config::ConfigError;
use aerogate_http::ServeError;

/// Failures of the line-delimited stdio transport.
#[derive(Debug, thiserror::Error)]
pub enum StdioError {
    /// A single line exceeded the framing limit. The line has been drained.
    #[error("Message exceeds maximum size of {max_bytes} bytes")]
    MessageTooLarge { max_bytes: usize },

    /// Reading stdin or writing stdout failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Anything that stops the gateway from starting or running.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("audit sink error: {0}")]
    Audit(#[from] AuditError),

    #[error(transparent)]
    Serve(#[from] ServeError),

    #[error("stdio transport error: {0}")]
    Stdio(#[from] StdioError),
}
