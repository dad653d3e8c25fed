use std::time::Duration;

use crate::cmd::{exchange, StatusArgs};
use crate::exit::CliResult;
use crate::output::OutputFormat;

pub fn run(args: StatusArgs, format: OutputFormat) -> CliResult<i32> {
    let header = serde_json::json!({
        "cmd": "status",
        "device": args.device,
    });

    exchange(&args.gateway, header, None, Duration::from_secs(5), format)
}
