use std::time::{Duration, Instant};

use modgate_transport::{DeviceLink, TransportError};
use tracing::{debug, warn};

use crate::ack::{classify, AckKind};
use crate::command::{LoadCommand, StartCommand, StopCommand};
use crate::machine::{
    AckMachine, LoadMachine, Outcome, StartMachine, StatusMachine, Step, StopMachine,
};

/// Drives one device command to completion over a single transport
/// session.
///
/// All device-side failures (error acks, timeouts, transport faults)
/// become terminal `{ok: false}` outcomes; nothing escapes as `Err` to
/// the caller.
pub struct ProtocolDriver<'a> {
    link: &'a mut DeviceLink,
}

impl<'a> ProtocolDriver<'a> {
    pub fn new(link: &'a mut DeviceLink) -> Self {
        Self { link }
    }

    /// LOAD: announce the module, stream its bytes, await the commit ack.
    pub fn load(&mut self, cmd: &LoadCommand) -> Outcome {
        let mut machine = LoadMachine::new();
        self.run(&cmd.to_line(), &mut machine, Some(cmd.payload.as_ref()))
    }

    /// START: kick a loaded module, optionally awaiting its RESULT.
    pub fn start(&mut self, cmd: &StartCommand) -> Outcome {
        let mut machine = StartMachine::new(cmd.wait_result, cmd.result_timeout);
        self.run(&cmd.to_line(), &mut machine, None)
    }

    /// STOP: halt a module, following the PENDING wind-down if reported.
    pub fn stop(&mut self, cmd: &StopCommand) -> Outcome {
        let mut machine = StopMachine::new(cmd.result_timeout);
        self.run(&cmd.to_line(), &mut machine, None)
    }

    /// STATUS: one snapshot line from the device.
    pub fn status(&mut self) -> Outcome {
        let mut machine = StatusMachine;
        self.run("STATUS", &mut machine, None)
    }

    fn run<M: AckMachine>(
        &mut self,
        line: &str,
        machine: &mut M,
        payload: Option<&[u8]>,
    ) -> Outcome {
        // Stale bytes from a previous exchange must not be classified as
        // acks for this one.
        if let Err(err) = self.link.drain_input() {
            return transport_outcome(err);
        }

        debug!(command = line, "issuing device command");
        if let Err(err) = self.link.write_line(line) {
            return transport_outcome(err);
        }

        loop {
            let ack = match self.await_ack(machine.expected(), machine.phase_timeout()) {
                Ok(ack) => ack,
                Err(err) => return transport_outcome(err),
            };
            let Some((kind, ack_line)) = ack else {
                return machine.on_timeout();
            };

            match machine.on_ack(kind, &ack_line) {
                Step::SendPayload => {
                    let Some(data) = payload else {
                        // LOAD is the only payload-bearing command and
                        // always supplies one.
                        return Outcome::err("internal: no payload for transfer phase");
                    };
                    debug!(bytes = data.len(), "transferring module payload");
                    if let Err(err) = self.link.write_bytes(data) {
                        return transport_outcome(err);
                    }
                }
                Step::Continue => {}
                Step::Done(outcome) => return outcome,
            }
        }
    }

    /// Wait until a line matching one of the expected prefixes arrives.
    ///
    /// Lines matching no candidate are discarded and the wait continues;
    /// `None` means the deadline elapsed without a qualifying ack.
    fn await_ack(
        &mut self,
        expected: &[AckKind],
        timeout: Duration,
    ) -> Result<Option<(AckKind, String)>, TransportError> {
        let until = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= until {
                return Ok(None);
            }
            match self.link.read_line(until - now)? {
                None => return Ok(None),
                Some(line) => {
                    if let Some(kind) = classify(&line, expected) {
                        return Ok(Some((kind, line)));
                    }
                    debug!(line = %line, "discarding unexpected device line");
                }
            }
        }
    }
}

fn transport_outcome(err: TransportError) -> Outcome {
    warn!(error = %err, "device transport failed mid-command");
    Outcome::err(format!("transport error: {err}"))
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread::JoinHandle;

    use modgate_transport::Endpoint;

    use super::*;

    /// One step of a scripted fake device.
    enum Script {
        ExpectLine(&'static str),
        ExpectBytes(usize),
        SendLine(&'static str),
    }

    /// Spawn a fake device on a loopback port and open a link to it.
    fn scripted_device(script: Vec<Script>) -> (DeviceLink, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            run_script(stream, script);
        });

        let endpoint = Endpoint::Tcp {
            host: addr.ip().to_string(),
            port: addr.port(),
        };
        (DeviceLink::open(&endpoint).unwrap(), handle)
    }

    fn run_script(stream: TcpStream, script: Vec<Script>) {
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut writer = stream;
        for step in script {
            match step {
                Script::ExpectLine(expected) => {
                    let mut line = String::new();
                    reader.read_line(&mut line).unwrap();
                    assert_eq!(line.trim_end(), expected);
                }
                Script::ExpectBytes(count) => {
                    let mut buf = vec![0u8; count];
                    reader.read_exact(&mut buf).unwrap();
                }
                Script::SendLine(line) => {
                    writer.write_all(line.as_bytes()).unwrap();
                    writer.write_all(b"\n").unwrap();
                }
            }
        }
    }

    #[test]
    fn load_happy_path_transfers_payload() {
        let (mut link, device) = scripted_device(vec![
            Script::ExpectLine("LOAD module_id=m1 size=4 crc32=ed82cd11"),
            Script::SendLine("LOAD_READY slot=0"),
            Script::ExpectBytes(4),
            Script::SendLine("LOAD_OK module_id=m1"),
        ]);

        let cmd = LoadCommand::new("m1", b"abcd".to_vec());
        let outcome = ProtocolDriver::new(&mut link).load(&cmd);

        assert!(outcome.ok);
        assert_eq!(outcome.detail.as_deref(), Some("LOAD_OK module_id=m1"));
        device.join().unwrap();
    }

    #[test]
    fn load_err_before_transfer_fails_without_payload() {
        let (mut link, device) = scripted_device(vec![
            Script::ExpectLine("LOAD module_id=m1 size=4 crc32=ed82cd11"),
            Script::SendLine("LOAD_ERR reason=no_slot"),
        ]);

        let cmd = LoadCommand::new("m1", b"abcd".to_vec());
        let outcome = ProtocolDriver::new(&mut link).load(&cmd);

        assert!(!outcome.ok);
        assert_eq!(outcome.error.as_deref(), Some("LOAD_ERR reason=no_slot"));
        device.join().unwrap();
    }

    #[test]
    fn start_immediate_error_line_fails() {
        let (mut link, device) = scripted_device(vec![
            Script::ExpectLine("START module_id=m1"),
            Script::SendLine("ERROR reason=not_found"),
        ]);

        let outcome = ProtocolDriver::new(&mut link).start(&StartCommand::new("m1"));

        assert!(!outcome.ok);
        assert_eq!(outcome.error.as_deref(), Some("ERROR reason=not_found"));
        device.join().unwrap();
    }

    #[test]
    fn start_early_result_short_circuits_the_wait() {
        let (mut link, device) = scripted_device(vec![
            Script::ExpectLine("START module_id=m1 func=sum"),
            Script::SendLine("RESULT module_id=m1 status=OK value=42"),
        ]);

        let cmd = StartCommand {
            func_name: Some("sum".to_string()),
            wait_result: true,
            ..StartCommand::new("m1")
        };
        let outcome = ProtocolDriver::new(&mut link).start(&cmd);

        assert!(outcome.ok);
        assert_eq!(
            outcome.detail.as_deref(),
            Some("RESULT module_id=m1 status=OK value=42")
        );
        device.join().unwrap();
    }

    #[test]
    fn start_zero_result_timeout_reports_definite_timeout() {
        let (mut link, device) = scripted_device(vec![
            Script::ExpectLine("START module_id=m1"),
            Script::SendLine("START_OK module_id=m1"),
        ]);

        let cmd = StartCommand {
            wait_result: true,
            result_timeout: Duration::ZERO,
            ..StartCommand::new("m1")
        };
        let outcome = ProtocolDriver::new(&mut link).start(&cmd);

        assert!(!outcome.ok);
        assert_eq!(outcome.error.as_deref(), Some("timeout waiting for RESULT"));
        device.join().unwrap();
    }

    #[test]
    fn stop_pending_follows_up_with_result() {
        let (mut link, device) = scripted_device(vec![
            Script::ExpectLine("STOP module_id=m1"),
            Script::SendLine("STOP_OK module_id=m1 status=PENDING"),
            Script::SendLine("RESULT module_id=m1 status=OK"),
        ]);

        let cmd = StopCommand::new("m1", Duration::from_secs(2));
        let outcome = ProtocolDriver::new(&mut link).stop(&cmd);

        assert!(outcome.ok);
        assert_eq!(
            outcome.detail.as_deref(),
            Some("RESULT module_id=m1 status=OK")
        );
        device.join().unwrap();
    }

    #[test]
    fn status_discards_noise_lines_until_match() {
        let (mut link, device) = scripted_device(vec![
            Script::ExpectLine("STATUS"),
            Script::SendLine("boot: agent ready"),
            Script::SendLine("STATUS modules=1 slots=4"),
        ]);

        let outcome = ProtocolDriver::new(&mut link).status();

        assert!(outcome.ok);
        assert_eq!(outcome.detail.as_deref(), Some("STATUS modules=1 slots=4"));
        device.join().unwrap();
    }

    #[test]
    fn status_repeats_identically_on_unchanged_device() {
        let mut details = Vec::new();
        for _ in 0..2 {
            let (mut link, device) = scripted_device(vec![
                Script::ExpectLine("STATUS"),
                Script::SendLine("STATUS modules=1 slots=4"),
            ]);
            let outcome = ProtocolDriver::new(&mut link).status();
            assert!(outcome.ok);
            details.push(outcome.detail);
            device.join().unwrap();
        }
        assert_eq!(details[0], details[1]);
    }
}
