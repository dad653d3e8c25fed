use crate::cmd::{client_timeout, exchange, StopArgs};
use crate::exit::CliResult;
use crate::output::OutputFormat;

pub fn run(args: StopArgs, format: OutputFormat) -> CliResult<i32> {
    let header = serde_json::json!({
        "cmd": "stop",
        "device": args.device,
        "module_id": args.module_id,
        "result_timeout": args.result_timeout,
    });

    exchange(
        &args.gateway,
        header,
        None,
        client_timeout(args.result_timeout),
        format,
    )
}
