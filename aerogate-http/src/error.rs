//! Errors that stop an HTTP transport from serving.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServeError {
    /// The listener could not be bound. Fatal at startup.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The accept loop failed after binding.
    #[error("HTTP server error: {0}")]
    Serve(#[source] std::io::Error),

    /// `serve` was asked to run a transport that is not HTTP.
    #[error("transport '{0}' is not served over HTTP")]
    NotHttp(aerogate_core::TransportKind),
}
