use std::fs;
use std::time::Duration;

use modgate_wire::crc32_hex;

use crate::cmd::{apply_replace_policy, exchange, LoadArgs};
use crate::exit::{io_error, CliResult};
use crate::output::OutputFormat;

/// Generous budget: a serial transfer of a large module takes a while.
const LOAD_TIMEOUT: Duration = Duration::from_secs(20);

pub fn run(args: LoadArgs, format: OutputFormat) -> CliResult<i32> {
    let blob = fs::read(&args.file)
        .map_err(|err| io_error(&format!("failed reading {}", args.file.display()), err))?;

    let mut header = serde_json::json!({
        "cmd": "load",
        "device": args.device,
        "module_id": args.module_id,
        "blob_size": blob.len(),
        "blob_crc32": crc32_hex(&blob),
        "blob_name": args.file.display().to_string(),
    });
    apply_replace_policy(&mut header, args.replace, &args.replace_victim);

    exchange(&args.gateway, header, Some(&blob), LOAD_TIMEOUT, format)
}
