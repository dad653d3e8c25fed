//! Device-link transport for the modgate gateway.
//!
//! Unifies serial UART devices and TCP-bridged (emulated) devices behind a
//! single line-oriented byte channel: write raw bytes, write ASCII lines,
//! read newline-terminated lines under a deadline, drain stale input.
//! Callers never see transport-kind-specific behavior.

pub mod endpoint;
pub mod error;
pub mod link;

pub use endpoint::{Endpoint, DEFAULT_BAUD};
pub use error::{Result, TransportError};
pub use link::DeviceLink;
