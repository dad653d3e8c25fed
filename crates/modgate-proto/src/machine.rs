//! Per-command acknowledgment state machines.
//!
//! Each device command is an explicit machine over classified ack lines,
//! with no I/O of its own: the driver feeds it matched lines and timeout
//! events, the machine answers with the next action. This keeps the
//! commands' differing terminal conditions (early RESULT on START, the
//! PENDING secondary wait on STOP) auditable and testable in isolation.

use std::time::Duration;

use crate::ack::{status_is_ok, status_is_pending, AckKind};

/// Wait budget for handshake-style acks.
pub const ACK_TIMEOUT: Duration = Duration::from_secs(3);

/// Wait budget for a STATUS reply.
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(2);

/// Terminal result of one driven device command.
///
/// Device-side failures never surface as `Err` from the driver; they are
/// represented here with `ok: false`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub ok: bool,
    pub detail: Option<String>,
    pub error: Option<String>,
}

impl Outcome {
    pub fn ok(detail: impl Into<String>) -> Self {
        Self {
            ok: true,
            detail: Some(detail.into()),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            detail: None,
            error: Some(error.into()),
        }
    }
}

/// Next driver action after feeding an ack line to a machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Write the raw module payload, then keep waiting (LOAD only).
    SendPayload,
    /// Keep waiting in the new phase.
    Continue,
    /// The command reached a terminal state.
    Done(Outcome),
}

/// A per-command acknowledgment machine, driven without I/O.
pub trait AckMachine {
    /// Ack prefixes accepted in the current phase, in match order.
    fn expected(&self) -> &'static [AckKind];

    /// Wait budget for the current phase.
    fn phase_timeout(&self) -> Duration;

    /// Feed a matched ack line; advance the machine or terminate.
    fn on_ack(&mut self, kind: AckKind, line: &str) -> Step;

    /// The phase deadline elapsed with no qualifying ack.
    fn on_timeout(&self) -> Outcome;
}

/// LOAD: header ack, payload transfer, commit ack.
pub struct LoadMachine {
    phase: LoadPhase,
}

#[derive(Debug, PartialEq, Eq)]
enum LoadPhase {
    AwaitReady,
    AwaitCommit,
}

impl LoadMachine {
    pub fn new() -> Self {
        Self {
            phase: LoadPhase::AwaitReady,
        }
    }
}

impl Default for LoadMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl AckMachine for LoadMachine {
    fn expected(&self) -> &'static [AckKind] {
        match self.phase {
            LoadPhase::AwaitReady => &[AckKind::LoadReady, AckKind::LoadErr],
            LoadPhase::AwaitCommit => &[AckKind::LoadOk, AckKind::LoadErr],
        }
    }

    fn phase_timeout(&self) -> Duration {
        ACK_TIMEOUT
    }

    fn on_ack(&mut self, kind: AckKind, line: &str) -> Step {
        match (&self.phase, kind) {
            (LoadPhase::AwaitReady, AckKind::LoadReady) => {
                self.phase = LoadPhase::AwaitCommit;
                Step::SendPayload
            }
            (LoadPhase::AwaitCommit, AckKind::LoadOk) => Step::Done(Outcome::ok(line)),
            (_, AckKind::LoadErr) => Step::Done(Outcome::err(line)),
            _ => Step::Continue,
        }
    }

    fn on_timeout(&self) -> Outcome {
        match self.phase {
            LoadPhase::AwaitReady => Outcome::err("timeout waiting for LOAD_READY/LOAD_ERR"),
            LoadPhase::AwaitCommit => Outcome::err("timeout waiting for LOAD_OK/LOAD_ERR"),
        }
    }
}

/// START: one ack phase, optionally followed by a RESULT wait.
pub struct StartMachine {
    wait_result: bool,
    result_timeout: Duration,
    phase: StartPhase,
}

#[derive(Debug, PartialEq, Eq)]
enum StartPhase {
    AwaitAck,
    AwaitResult,
}

impl StartMachine {
    pub fn new(wait_result: bool, result_timeout: Duration) -> Self {
        Self {
            wait_result,
            result_timeout,
            phase: StartPhase::AwaitAck,
        }
    }
}

impl AckMachine for StartMachine {
    fn expected(&self) -> &'static [AckKind] {
        match self.phase {
            StartPhase::AwaitAck => &[AckKind::StartOk, AckKind::Result, AckKind::Error],
            StartPhase::AwaitResult => &[AckKind::Result],
        }
    }

    fn phase_timeout(&self) -> Duration {
        match self.phase {
            StartPhase::AwaitAck => ACK_TIMEOUT,
            StartPhase::AwaitResult => self.result_timeout,
        }
    }

    fn on_ack(&mut self, kind: AckKind, line: &str) -> Step {
        match (&self.phase, kind) {
            (StartPhase::AwaitAck, AckKind::Error) => Step::Done(Outcome::err(line)),
            // A RESULT before START_OK is the final answer either way.
            (_, AckKind::Result) => Step::Done(result_outcome(line)),
            (StartPhase::AwaitAck, AckKind::StartOk) => {
                if self.wait_result {
                    self.phase = StartPhase::AwaitResult;
                    Step::Continue
                } else {
                    Step::Done(Outcome::ok("START_OK"))
                }
            }
            _ => Step::Continue,
        }
    }

    fn on_timeout(&self) -> Outcome {
        match self.phase {
            StartPhase::AwaitAck => Outcome::err("timeout waiting for START_OK/RESULT/ERROR"),
            StartPhase::AwaitResult => Outcome::err("timeout waiting for RESULT"),
        }
    }
}

fn result_outcome(line: &str) -> Outcome {
    if status_is_ok(line) {
        Outcome::ok(line)
    } else {
        Outcome::err(line)
    }
}

/// STOP: ack phase, with a secondary RESULT wait while the device winds
/// the module down.
pub struct StopMachine {
    result_timeout: Duration,
    phase: StopPhase,
}

#[derive(Debug, PartialEq, Eq)]
enum StopPhase {
    AwaitAck,
    AwaitResult,
}

impl StopMachine {
    pub fn new(result_timeout: Duration) -> Self {
        Self {
            result_timeout,
            phase: StopPhase::AwaitAck,
        }
    }
}

impl AckMachine for StopMachine {
    fn expected(&self) -> &'static [AckKind] {
        match self.phase {
            StopPhase::AwaitAck => &[AckKind::StopOk, AckKind::Result, AckKind::Error],
            StopPhase::AwaitResult => &[AckKind::Result],
        }
    }

    fn phase_timeout(&self) -> Duration {
        match self.phase {
            StopPhase::AwaitAck => ACK_TIMEOUT,
            StopPhase::AwaitResult => self.result_timeout,
        }
    }

    fn on_ack(&mut self, kind: AckKind, line: &str) -> Step {
        match (&self.phase, kind) {
            // The device may answer with an already-final RESULT or ERROR;
            // it is carried verbatim as detail, not re-failed here.
            (StopPhase::AwaitAck, AckKind::Result | AckKind::Error) => {
                Step::Done(Outcome::ok(line))
            }
            (StopPhase::AwaitAck, AckKind::StopOk) => {
                if status_is_pending(line) {
                    self.phase = StopPhase::AwaitResult;
                    Step::Continue
                } else {
                    Step::Done(Outcome::ok(line))
                }
            }
            (StopPhase::AwaitResult, AckKind::Result) => Step::Done(Outcome::ok(line)),
            _ => Step::Continue,
        }
    }

    fn on_timeout(&self) -> Outcome {
        match self.phase {
            StopPhase::AwaitAck => Outcome::err("timeout waiting for STOP_OK/RESULT/ERROR"),
            StopPhase::AwaitResult => Outcome::err("timeout waiting for RESULT (stop)"),
        }
    }
}

/// STATUS: a single reply line.
pub struct StatusMachine;

impl AckMachine for StatusMachine {
    fn expected(&self) -> &'static [AckKind] {
        &[AckKind::Status, AckKind::Error, AckKind::Result]
    }

    fn phase_timeout(&self) -> Duration {
        STATUS_TIMEOUT
    }

    fn on_ack(&mut self, _kind: AckKind, line: &str) -> Step {
        Step::Done(Outcome::ok(line))
    }

    fn on_timeout(&self) -> Outcome {
        Outcome::err("timeout waiting for STATUS")
    }
}
