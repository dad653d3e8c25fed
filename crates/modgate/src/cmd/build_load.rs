use std::fs;
use std::time::Duration;

use modgate_wire::crc32_hex;

use crate::cmd::{apply_replace_policy, exchange, BuildLoadArgs};
use crate::exit::{io_error, CliResult};
use crate::output::OutputFormat;

/// Compile plus transfer can be slow, especially the aot step.
const BUILD_TIMEOUT: Duration = Duration::from_secs(60);

pub fn run(args: BuildLoadArgs, format: OutputFormat) -> CliResult<i32> {
    let source = fs::read(&args.source)
        .map_err(|err| io_error(&format!("failed reading {}", args.source.display()), err))?;

    let mut header = serde_json::json!({
        "cmd": "build_and_load",
        "device": args.device,
        "module_id": args.module_id,
        "mode": args.mode.as_str(),
        "source_size": source.len(),
        "source_crc32": crc32_hex(&source),
        "source_name": args.source.display().to_string(),
    });
    apply_replace_policy(&mut header, args.replace, &args.replace_victim);

    exchange(&args.gateway, header, Some(&source), BUILD_TIMEOUT, format)
}
