use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{client_error, CliResult, FAILURE, SUCCESS};
use crate::output::{print_response, OutputFormat};

pub mod build_load;
pub mod load;
pub mod serve;
pub mod start;
pub mod status;
pub mod stop;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the gateway server.
    Serve(ServeArgs),
    /// Load a prebuilt .wasm/.aot module onto a device.
    Load(LoadArgs),
    /// Start a loaded module, optionally waiting for its result.
    Start(StartArgs),
    /// Stop a running module.
    Stop(StopArgs),
    /// Query a device's module status.
    Status(StatusArgs),
    /// Compile a C source and load the artifact onto a device.
    BuildAndLoad(BuildLoadArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args),
        Command::Load(args) => load::run(args, format),
        Command::Start(args) => start::run(args, format),
        Command::Stop(args) => stop::run(args, format),
        Command::Status(args) => status::run(args, format),
        Command::BuildAndLoad(args) => build_load::run(args, format),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Device table config file.
    #[arg(long, value_name = "FILE")]
    pub config: PathBuf,
    /// Listen host.
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,
    /// Listen port.
    #[arg(long, default_value_t = 9000)]
    pub port: u16,
}

#[derive(Args, Debug)]
pub struct LoadArgs {
    /// Gateway address.
    #[arg(long, default_value = "localhost:9000", value_name = "HOST:PORT")]
    pub gateway: String,
    /// Logical device name.
    #[arg(long)]
    pub device: String,
    /// Module identifier on the device.
    #[arg(long)]
    pub module_id: String,
    /// Prebuilt .wasm or .aot file.
    #[arg(long, value_name = "FILE")]
    pub file: PathBuf,
    /// Replace an existing module if slots are full.
    #[arg(long)]
    pub replace: bool,
    /// Module to evict when replacing.
    #[arg(long, value_name = "MODULE_ID")]
    pub replace_victim: Option<String>,
}

#[derive(Args, Debug)]
pub struct StartArgs {
    /// Gateway address.
    #[arg(long, default_value = "localhost:9000", value_name = "HOST:PORT")]
    pub gateway: String,
    /// Logical device name.
    #[arg(long)]
    pub device: String,
    /// Module identifier on the device.
    #[arg(long)]
    pub module_id: String,
    /// Function to invoke (device default entry point if omitted).
    #[arg(long)]
    pub func_name: Option<String>,
    /// Arguments, e.g. "a=1,b=2".
    #[arg(long)]
    pub func_args: Option<String>,
    /// Wait for the module's RESULT line.
    #[arg(long)]
    pub wait_result: bool,
    /// Seconds to wait for RESULT.
    #[arg(long, default_value_t = 10.0)]
    pub result_timeout: f64,
}

#[derive(Args, Debug)]
pub struct StopArgs {
    /// Gateway address.
    #[arg(long, default_value = "localhost:9000", value_name = "HOST:PORT")]
    pub gateway: String,
    /// Logical device name.
    #[arg(long)]
    pub device: String,
    /// Module identifier on the device.
    #[arg(long)]
    pub module_id: String,
    /// Seconds to wait for RESULT after a pending stop.
    #[arg(long, default_value_t = 10.0)]
    pub result_timeout: f64,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Gateway address.
    #[arg(long, default_value = "localhost:9000", value_name = "HOST:PORT")]
    pub gateway: String,
    /// Logical device name.
    #[arg(long)]
    pub device: String,
}

#[derive(Args, Debug)]
pub struct BuildLoadArgs {
    /// Gateway address.
    #[arg(long, default_value = "localhost:9000", value_name = "HOST:PORT")]
    pub gateway: String,
    /// Logical device name.
    #[arg(long)]
    pub device: String,
    /// Module identifier on the device.
    #[arg(long)]
    pub module_id: String,
    /// C source file to compile.
    #[arg(long, value_name = "FILE")]
    pub source: PathBuf,
    /// Artifact kind to build and load.
    #[arg(long, default_value = "wasm")]
    pub mode: BuildModeArg,
    /// Replace an existing module if slots are full.
    #[arg(long)]
    pub replace: bool,
    /// Module to evict when replacing.
    #[arg(long, value_name = "MODULE_ID")]
    pub replace_victim: Option<String>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum BuildModeArg {
    Wasm,
    Aot,
}

impl BuildModeArg {
    pub fn as_str(self) -> &'static str {
        match self {
            BuildModeArg::Wasm => "wasm",
            BuildModeArg::Aot => "aot",
        }
    }
}

/// One request/response exchange with the gateway; prints the response
/// and maps `ok` to the exit code.
pub(crate) fn exchange(
    gateway: &str,
    header: serde_json::Value,
    blob: Option<&[u8]>,
    timeout: Duration,
    format: OutputFormat,
) -> CliResult<i32> {
    let response = modgate::send_request(gateway, &header, blob, timeout)
        .map_err(|err| client_error("request failed", err))?;
    print_response(&response, format);
    Ok(if response.ok { SUCCESS } else { FAILURE })
}

/// Client-side receive budget for a command that waits `result_secs` on
/// the device: the device wait plus slack for the gateway round trip.
pub(crate) fn client_timeout(result_secs: f64) -> Duration {
    Duration::try_from_secs_f64(result_secs + 5.0).unwrap_or(Duration::from_secs(5))
}

/// Apply the shared replace-policy flags to a request header.
pub(crate) fn apply_replace_policy(
    header: &mut serde_json::Value,
    replace: bool,
    replace_victim: &Option<String>,
) {
    if replace || replace_victim.is_some() {
        header["replace"] = serde_json::Value::Bool(true);
        if let Some(victim) = replace_victim {
            header["replace_victim"] = serde_json::Value::String(victim.clone());
        }
    }
}
