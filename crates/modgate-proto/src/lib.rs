//! Device-facing command protocol for the modgate gateway.
//!
//! Encodes module commands as ASCII `key=value` lines, classifies the
//! device's acknowledgment lines by prefix, and drives each command's
//! multi-phase handshake (including the LOAD blob transfer) to a terminal
//! outcome over one transport session.

pub mod ack;
pub mod command;
pub mod driver;
pub mod machine;

pub use ack::{classify, status_is_ok, status_is_pending, AckKind};
pub use command::{LoadCommand, StartCommand, StopCommand};
pub use driver::ProtocolDriver;
pub use machine::{
    AckMachine, LoadMachine, Outcome, StartMachine, StatusMachine, Step, StopMachine,
    ACK_TIMEOUT, STATUS_TIMEOUT,
};
