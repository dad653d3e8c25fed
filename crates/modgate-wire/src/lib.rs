//! Client-facing envelope codec for the modgate gateway.
//!
//! One exchange per connection: a newline-terminated JSON header naming
//! the device and command, an optional length-declared binary payload
//! immediately after the newline, and exactly one JSON response line back.
//! Payload integrity is checked with CRC-32 before anything reaches a
//! device.

pub mod checksum;
pub mod error;
pub mod request;
pub mod response;

pub use checksum::{crc32_hex, verify_crc32};
pub use error::{Result, WireError};
pub use request::{
    BuildAndLoadRequest, BuildMode, EnvelopeReader, LoadRequest, Request, StartRequest,
    StatusRequest, StopRequest, WireConfig, DEFAULT_MAX_HEADER, DEFAULT_MAX_PAYLOAD,
    DEFAULT_RESULT_TIMEOUT_SECS,
};
pub use response::Response;
