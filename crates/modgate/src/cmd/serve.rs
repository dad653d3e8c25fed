use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use modgate::{GatewayConfig, GatewayServer};

use crate::cmd::ServeArgs;
use crate::exit::{config_error, io_error, CliError, CliResult, INTERNAL, SUCCESS};

pub fn run(args: ServeArgs) -> CliResult<i32> {
    let table = GatewayConfig::load(&args.config)
        .map_err(|err| config_error("loading config", err))?
        .into_table()
        .map_err(|err| config_error("building device table", err))?;

    let listener = TcpListener::bind((args.host.as_str(), args.port))
        .map_err(|err| io_error("bind failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let server = GatewayServer::new(table);
    server
        .serve(listener, &running)
        .map_err(|err| io_error("accept failed", err))?;

    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
