//! Operational logging setup.
//!
//! Logs always go to stderr: stdout is the protocol channel of the stdio
//! transport. HTTP transports log JSON lines through a non-blocking writer.

use aerogate_core::TransportKind;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

fn env_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Plain stderr subscriber used while configuration is being resolved,
/// before the transport (and with it the log format) is known.
pub fn bootstrap_subscriber(verbose: bool) -> impl tracing::Subscriber + Send + Sync {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .with_writer(std::io::stderr)
        .finish()
}

/// Install the process-wide subscriber.
///
/// The returned guard must be held until exit so buffered lines are flushed.
pub fn init_tracing(verbose: bool, transport: TransportKind) -> WorkerGuard {
    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .with_writer(writer);

    if transport.is_http() {
        builder.json().init();
    } else {
        builder.with_ansi(false).init();
    }
    guard
}
