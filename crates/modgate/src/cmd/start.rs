use std::time::Duration;

use crate::cmd::{client_timeout, exchange, StartArgs};
use crate::exit::CliResult;
use crate::output::OutputFormat;

pub fn run(args: StartArgs, format: OutputFormat) -> CliResult<i32> {
    let mut header = serde_json::json!({
        "cmd": "start",
        "device": args.device,
        "module_id": args.module_id,
        "wait_result": args.wait_result,
        "result_timeout": args.result_timeout,
    });
    if let Some(func) = &args.func_name {
        header["func_name"] = serde_json::Value::String(func.clone());
    }
    if let Some(func_args) = &args.func_args {
        header["func_args"] = serde_json::Value::String(func_args.clone());
    }

    let timeout = if args.wait_result {
        client_timeout(args.result_timeout)
    } else {
        Duration::from_secs(10)
    };
    exchange(&args.gateway, header, None, timeout, format)
}
