//! Closed protocol surface: method table, operation classification and
//! request/response payload types.
//!
//! The method set is fixed per protocol version. Adding a method means adding
//! a [`Method`] variant; there is no runtime registration.

mod classification;
mod messages;
mod methods;

pub use classification::*;
pub use messages::*;
pub use methods::*;

/// Protocol version announced in the `initialize` handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";
