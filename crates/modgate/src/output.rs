use std::io::IsTerminal;

use clap::ValueEnum;
use modgate_wire::Response;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Json,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

/// Print the gateway's response to stdout.
pub fn print_response(response: &Response, format: OutputFormat) {
    match format {
        OutputFormat::Json => print!("{}", response.to_line()),
        OutputFormat::Pretty => {
            let rendered = serde_json::to_string_pretty(response)
                .unwrap_or_else(|_| response.to_line().trim_end().to_string());
            println!("{rendered}");
        }
    }
}
