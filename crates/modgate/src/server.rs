use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use modgate_proto::{LoadCommand, Outcome, ProtocolDriver, StartCommand, StopCommand};
use modgate_transport::DeviceLink;
use modgate_wire::{
    verify_crc32, BuildAndLoadRequest, EnvelopeReader, LoadRequest, Request, Response,
    StartRequest, StopRequest,
};
use tracing::{debug, info, warn};

use crate::config::{DeviceEntry, DeviceTable};
use crate::toolchain::{BuildError, Toolchain, WamrToolchain};

/// Read deadline for client header and payload bytes.
const CLIENT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// The gateway: accepts client connections, decodes envelopes, drives
/// device commands, writes back one response per request.
///
/// One worker thread per connection, fully blocking I/O. Each device
/// command runs inside that device's channel lock over a fresh transport
/// session.
pub struct GatewayServer {
    devices: Arc<DeviceTable>,
    toolchain: Arc<dyn Toolchain>,
}

impl Clone for GatewayServer {
    fn clone(&self) -> Self {
        Self {
            devices: Arc::clone(&self.devices),
            toolchain: Arc::clone(&self.toolchain),
        }
    }
}

impl GatewayServer {
    /// Create a server over the given device table with the default
    /// clang/wamrc toolchain.
    pub fn new(devices: DeviceTable) -> Self {
        Self::with_toolchain(devices, Arc::new(WamrToolchain::default()))
    }

    /// Create a server with an explicit toolchain (stubbed in tests).
    pub fn with_toolchain(devices: DeviceTable, toolchain: Arc<dyn Toolchain>) -> Self {
        Self {
            devices: Arc::new(devices),
            toolchain,
        }
    }

    /// Accept loop: one worker thread per client connection, until
    /// `running` is cleared.
    pub fn serve(&self, listener: TcpListener, running: &AtomicBool) -> std::io::Result<()> {
        info!(addr = %listener.local_addr()?, "gateway listening");
        while running.load(Ordering::SeqCst) {
            let (stream, peer) = listener.accept()?;
            let server = self.clone();
            std::thread::spawn(move || server.handle_client(stream, peer));
        }
        Ok(())
    }

    /// One full exchange: decode, dispatch, respond, close.
    pub fn handle_client(&self, stream: TcpStream, peer: SocketAddr) {
        debug!(%peer, "client connected");
        if let Err(err) = stream.set_read_timeout(Some(CLIENT_READ_TIMEOUT)) {
            warn!(%peer, error = %err, "failed to set client read timeout");
            return;
        }
        let mut write_half = match stream.try_clone() {
            Ok(clone) => clone,
            Err(err) => {
                warn!(%peer, error = %err, "failed to clone client stream");
                return;
            }
        };

        let mut reader = EnvelopeReader::new(stream);
        let response = self.process(&mut reader);

        let ok = response.ok;
        if let Err(err) = write_half.write_all(response.to_line().as_bytes()) {
            warn!(%peer, error = %err, "failed to write response");
        }
        debug!(%peer, ok, "request finished");
    }

    /// Decode one envelope and dispatch it; every failure becomes a
    /// structured error response.
    pub fn process<R: Read>(&self, reader: &mut EnvelopeReader<R>) -> Response {
        let request = match reader.read_header() {
            Ok(request) => request,
            Err(err) => return Response::err(err.to_string()),
        };
        info!(
            cmd = request.command_name(),
            device = request.device(),
            "request received"
        );

        let Some(entry) = self.devices.get(request.device()) else {
            return Response::err(format!("unknown device: {}", request.device()));
        };

        // Integrity is checked before any device interaction; a corrupted
        // payload never reaches the driver.
        let payload = match request.declared_payload() {
            Some((size, declared)) => {
                let bytes = match reader.read_payload(size) {
                    Ok(bytes) => bytes,
                    Err(err) => return Response::err(err.to_string()),
                };
                if let Err(err) = verify_crc32(&bytes, declared) {
                    return Response::err(err.to_string());
                }
                bytes
            }
            None => Bytes::new(),
        };

        match request {
            Request::Load(req) => self.handle_load(entry, req, payload),
            Request::Start(req) => self.handle_start(entry, req),
            Request::Stop(req) => self.handle_stop(entry, req),
            Request::Status(_) => self.with_device(entry, |driver| driver.status()),
            Request::BuildAndLoad(req) => self.handle_build_and_load(entry, req, payload),
        }
    }

    fn handle_load(&self, entry: &DeviceEntry, req: LoadRequest, blob: Bytes) -> Response {
        if let Some(name) = &req.blob_name {
            debug!(blob_name = %name, "loading client-supplied artifact");
        }
        let mut cmd = LoadCommand::new(req.module_id, blob);
        if req.replace || req.replace_victim.is_some() {
            cmd = cmd.with_replace(req.replace_victim);
        }
        self.with_device(entry, |driver| driver.load(&cmd))
    }

    fn handle_start(&self, entry: &DeviceEntry, req: StartRequest) -> Response {
        let cmd = StartCommand {
            module_id: req.module_id,
            func_name: req.func_name.filter(|name| !name.is_empty()),
            func_args: req.func_args.filter(|args| !args.is_empty()),
            wait_result: req.wait_result,
            result_timeout: result_timeout(req.result_timeout),
        };
        self.with_device(entry, |driver| driver.start(&cmd))
    }

    fn handle_stop(&self, entry: &DeviceEntry, req: StopRequest) -> Response {
        let cmd = StopCommand::new(req.module_id, result_timeout(req.result_timeout));
        self.with_device(entry, |driver| driver.stop(&cmd))
    }

    fn handle_build_and_load(
        &self,
        entry: &DeviceEntry,
        req: BuildAndLoadRequest,
        source: Bytes,
    ) -> Response {
        if let Some(name) = &req.source_name {
            debug!(source_name = %name, "building client-supplied source");
        }

        let scratch = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(err) => return Response::err(format!("build scratch dir: {err}")),
        };
        let source_path = scratch.path().join(format!("{}.c", req.module_id));
        if let Err(err) = std::fs::write(&source_path, &source) {
            return Response::err(format!("writing source: {err}"));
        }

        let artifacts =
            match self
                .toolchain
                .build(&source_path, req.mode, scratch.path(), &req.module_id)
            {
                Ok(artifacts) => artifacts,
                Err(err) => {
                    // Build failures short-circuit: the LOAD flow is never
                    // attempted and the diagnostics go back verbatim.
                    let message = err.to_string();
                    let step = err.step();
                    let response = Response::err(message).with_step(step);
                    return match err {
                        BuildError::Compile { stdout, stderr, .. } => {
                            response.with_diagnostics(stdout, stderr)
                        }
                        _ => response,
                    };
                }
            };

        let blob = match std::fs::read(artifacts.deploy_path()) {
            Ok(blob) => blob,
            Err(err) => return Response::err(format!("reading artifact: {err}")),
        };

        let mut cmd = LoadCommand::new(req.module_id, blob);
        if req.replace || req.replace_victim.is_some() {
            cmd = cmd.with_replace(req.replace_victim);
        }

        let mut response = self
            .with_device(entry, |driver| driver.load(&cmd))
            .with_step("load")
            .with_wasm_path(artifacts.wasm_path.display().to_string());
        if let Some(aot) = &artifacts.aot_path {
            response = response.with_aot_path(aot.display().to_string());
        }
        response
    }

    /// Run one command inside the device's channel lock over a fresh
    /// transport session.
    fn with_device<F>(&self, entry: &DeviceEntry, run: F) -> Response
    where
        F: FnOnce(&mut ProtocolDriver<'_>) -> Outcome,
    {
        let _channel = entry.lock_channel();
        let mut link = match DeviceLink::open(entry.endpoint()) {
            Ok(link) => link,
            Err(err) => {
                warn!(device = entry.name(), error = %err, "device unreachable");
                return Response::err(err.to_string());
            }
        };
        let outcome = run(&mut ProtocolDriver::new(&mut link));
        response_from_outcome(outcome)
    }
}

fn response_from_outcome(outcome: Outcome) -> Response {
    if outcome.ok {
        Response::ok(outcome.detail.unwrap_or_default())
    } else {
        Response::err(outcome.error.unwrap_or_default())
    }
}

/// Client-supplied RESULT timeouts arrive as float seconds; negative or
/// non-finite values collapse to an immediate deadline.
fn result_timeout(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
}
