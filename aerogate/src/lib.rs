//! aerogate binary support: stdio transport, CLI, logging and bootstrap.
//!
//! Kept as a library so integration tests can drive the stdio transport and
//! the bootstrap without spawning a process.

pub mod app;
pub mod cli;
pub mod error;
pub mod stdio;
pub mod telemetry;
