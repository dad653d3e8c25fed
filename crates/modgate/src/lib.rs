//! modgate — a gateway bridging control-plane clients to embedded module
//! runtimes reachable over serial UART or TCP bridges.
//!
//! # Crate Structure
//!
//! - [`modgate_transport`] — serial/TCP device links behind one byte channel
//! - [`modgate_wire`] — client envelope codec with CRC-32 integrity
//! - [`modgate_proto`] — device command state machines and driver
//! - this crate — device table config, gateway server, build toolchain,
//!   and the host-side client used by the CLI

pub mod client;
pub mod config;
pub mod server;
pub mod toolchain;

pub use client::{send_request, ClientError};
pub use config::{ConfigError, DeviceEntry, DeviceTable, GatewayConfig};
pub use server::GatewayServer;
pub use toolchain::{BuildArtifacts, BuildError, Toolchain, WamrToolchain};
