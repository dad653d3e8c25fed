use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use modgate::toolchain::Result as BuildResult;
use modgate::{BuildArtifacts, BuildError, DeviceTable, GatewayServer, Toolchain};
use modgate_wire::{crc32_hex, BuildMode};

/// One step of a scripted fake device.
enum Script {
    ExpectLine(String),
    ExpectBytes(usize),
    SendLine(&'static str),
}

/// Bind a fake device on a loopback port and play the script for one
/// connection.
fn spawn_fake_device(script: Vec<Script>) -> (u16, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("device should bind");
    let port = listener.local_addr().expect("addr").port();

    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("device should accept");
        let mut reader = BufReader::new(stream.try_clone().expect("clone"));
        let mut writer = stream;
        for step in script {
            match step {
                Script::ExpectLine(expected) => {
                    let mut line = String::new();
                    reader.read_line(&mut line).expect("device read");
                    assert_eq!(line.trim_end(), expected);
                }
                Script::ExpectBytes(count) => {
                    let mut buf = vec![0u8; count];
                    reader.read_exact(&mut buf).expect("device payload read");
                }
                Script::SendLine(line) => {
                    writer.write_all(line.as_bytes()).expect("device write");
                    writer.write_all(b"\n").expect("device write nl");
                }
            }
        }
    });

    (port, handle)
}

/// Bind a listener that only records whether anything connected.
fn spawn_tripwire_device() -> (u16, Arc<AtomicBool>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("tripwire should bind");
    let port = listener.local_addr().expect("addr").port();
    let contacted = Arc::new(AtomicBool::new(false));

    let flag = Arc::clone(&contacted);
    thread::spawn(move || {
        listener.set_nonblocking(true).expect("nonblocking");
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if listener.accept().is_ok() {
                flag.store(true, Ordering::SeqCst);
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
    });

    (port, contacted)
}

/// Start a gateway over the given device map; returns its address.
fn spawn_gateway(
    devices: HashMap<String, String>,
    toolchain: Option<Arc<dyn Toolchain>>,
) -> String {
    let table = DeviceTable::from_entries(devices).expect("device table");
    let server = match toolchain {
        Some(toolchain) => GatewayServer::with_toolchain(table, toolchain),
        None => GatewayServer::new(table),
    };

    let listener = TcpListener::bind("127.0.0.1:0").expect("gateway should bind");
    let addr = listener.local_addr().expect("addr").to_string();

    thread::spawn(move || {
        let running = AtomicBool::new(true);
        let _ = server.serve(listener, &running);
    });

    addr
}

fn device_map(name: &str, port: u16) -> HashMap<String, String> {
    HashMap::from([(name.to_string(), format!("tcp:127.0.0.1:{port}"))])
}

#[test]
fn successful_load_end_to_end() {
    let blob = b"abcd";
    let (port, device) = spawn_fake_device(vec![
        Script::ExpectLine(format!("LOAD module_id=m1 size=4 crc32={}", crc32_hex(blob))),
        Script::SendLine("LOAD_READY slot=0"),
        Script::ExpectBytes(4),
        Script::SendLine("LOAD_OK module_id=m1"),
    ]);
    let gateway = spawn_gateway(device_map("d1", port), None);

    let header = serde_json::json!({
        "cmd": "load",
        "device": "d1",
        "module_id": "m1",
        "blob_size": blob.len(),
        "blob_crc32": crc32_hex(blob),
    });
    let response =
        modgate::send_request(&gateway, &header, Some(blob), Duration::from_secs(5)).unwrap();

    assert!(response.ok);
    assert_eq!(response.detail.as_deref(), Some("LOAD_OK module_id=m1"));
    device.join().unwrap();
}

#[test]
fn checksum_mismatch_never_contacts_the_device() {
    let (port, contacted) = spawn_tripwire_device();
    let gateway = spawn_gateway(device_map("d1", port), None);

    let header = serde_json::json!({
        "cmd": "load",
        "device": "d1",
        "module_id": "m1",
        "blob_size": 4,
        "blob_crc32": "deadbeef",
    });
    let response =
        modgate::send_request(&gateway, &header, Some(b"abcd"), Duration::from_secs(5)).unwrap();

    assert!(!response.ok);
    let error = response.error.unwrap();
    assert!(error.starts_with("CRC mismatch expected=deadbeef got="));

    thread::sleep(Duration::from_millis(150));
    assert!(
        !contacted.load(Ordering::SeqCst),
        "device must not be contacted after an integrity failure"
    );
}

#[test]
fn start_with_immediate_device_error() {
    let (port, device) = spawn_fake_device(vec![
        Script::ExpectLine("START module_id=m1 func=missing".to_string()),
        Script::SendLine("ERROR reason=not_found"),
    ]);
    let gateway = spawn_gateway(device_map("d1", port), None);

    let header = serde_json::json!({
        "cmd": "start",
        "device": "d1",
        "module_id": "m1",
        "func_name": "missing",
    });
    let response = modgate::send_request(&gateway, &header, None, Duration::from_secs(5)).unwrap();

    assert!(!response.ok);
    assert_eq!(response.error.as_deref(), Some("ERROR reason=not_found"));
    device.join().unwrap();
}

#[test]
fn stop_with_pending_completion_reflects_final_result() {
    let (port, device) = spawn_fake_device(vec![
        Script::ExpectLine("STOP module_id=m1".to_string()),
        Script::SendLine("STOP_OK module_id=m1 status=PENDING"),
        Script::SendLine("RESULT module_id=m1 status=OK ticks=1281"),
    ]);
    let gateway = spawn_gateway(device_map("d1", port), None);

    let header = serde_json::json!({
        "cmd": "stop",
        "device": "d1",
        "module_id": "m1",
        "result_timeout": 5.0,
    });
    let response = modgate::send_request(&gateway, &header, None, Duration::from_secs(8)).unwrap();

    assert!(response.ok);
    assert_eq!(
        response.detail.as_deref(),
        Some("RESULT module_id=m1 status=OK ticks=1281")
    );
    device.join().unwrap();
}

#[test]
fn unknown_device_is_rejected_without_io() {
    let gateway = spawn_gateway(device_map("d1", 1), None);

    let header = serde_json::json!({"cmd": "status", "device": "ghost"});
    let response = modgate::send_request(&gateway, &header, None, Duration::from_secs(5)).unwrap();

    assert!(!response.ok);
    assert_eq!(response.error.as_deref(), Some("unknown device: ghost"));
}

struct StubToolchain {
    artifact: Vec<u8>,
}

impl Toolchain for StubToolchain {
    fn build(
        &self,
        source: &Path,
        mode: BuildMode,
        out_dir: &Path,
        module_id: &str,
    ) -> BuildResult<BuildArtifacts> {
        assert!(source.exists(), "gateway must materialize the source file");
        let wasm_path = out_dir.join(format!("{module_id}.wasm"));
        std::fs::write(&wasm_path, &self.artifact)?;
        let aot_path = match mode {
            BuildMode::Wasm => None,
            BuildMode::Aot => {
                let aot_path = out_dir.join(format!("{module_id}.aot"));
                std::fs::write(&aot_path, &self.artifact)?;
                Some(aot_path)
            }
        };
        Ok(BuildArtifacts {
            wasm_path,
            aot_path,
        })
    }
}

struct BrokenToolchain;

impl Toolchain for BrokenToolchain {
    fn build(
        &self,
        _source: &Path,
        _mode: BuildMode,
        _out_dir: &Path,
        _module_id: &str,
    ) -> BuildResult<BuildArtifacts> {
        Err(BuildError::Compile {
            step: "compile_wasm",
            stdout: String::new(),
            stderr: "fft.c:7: call to undeclared function 'sinf'".to_string(),
        })
    }
}

#[test]
fn build_and_load_compiles_then_loads_artifact() {
    let artifact = b"\0asm\x01\0\0\0".to_vec();
    let (port, device) = spawn_fake_device(vec![
        Script::ExpectLine(format!(
            "LOAD module_id=fft size={} crc32={}",
            artifact.len(),
            crc32_hex(&artifact)
        )),
        Script::SendLine("LOAD_READY slot=1"),
        Script::ExpectBytes(artifact.len()),
        Script::SendLine("LOAD_OK module_id=fft"),
    ]);
    let gateway = spawn_gateway(
        device_map("d1", port),
        Some(Arc::new(StubToolchain { artifact })),
    );

    let source = b"int app_main(void){return 0;}";
    let header = serde_json::json!({
        "cmd": "build_and_load",
        "device": "d1",
        "module_id": "fft",
        "mode": "wasm",
        "source_size": source.len(),
        "source_crc32": crc32_hex(source),
    });
    let response =
        modgate::send_request(&gateway, &header, Some(source), Duration::from_secs(10)).unwrap();

    assert!(response.ok);
    assert_eq!(response.step.as_deref(), Some("load"));
    assert!(response.wasm_path.unwrap().ends_with("fft.wasm"));
    assert_eq!(response.aot_path, None);
    device.join().unwrap();
}

#[test]
fn build_failure_short_circuits_before_the_device() {
    let (port, contacted) = spawn_tripwire_device();
    let gateway = spawn_gateway(device_map("d1", port), Some(Arc::new(BrokenToolchain)));

    let source = b"flaot x;";
    let header = serde_json::json!({
        "cmd": "build_and_load",
        "device": "d1",
        "module_id": "fft",
        "source_size": source.len(),
        "source_crc32": crc32_hex(source),
    });
    let response =
        modgate::send_request(&gateway, &header, Some(source), Duration::from_secs(5)).unwrap();

    assert!(!response.ok);
    assert_eq!(response.step.as_deref(), Some("compile_wasm"));
    assert!(response.stderr.unwrap().contains("undeclared function"));

    thread::sleep(Duration::from_millis(150));
    assert!(
        !contacted.load(Ordering::SeqCst),
        "LOAD must not be attempted after a build failure"
    );
}
