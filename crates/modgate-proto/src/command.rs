use std::time::Duration;

use bytes::Bytes;
use modgate_wire::checksum::crc32_hex;

/// Module load: header line, then the raw payload bytes after LOAD_READY.
#[derive(Debug, Clone)]
pub struct LoadCommand {
    pub module_id: String,
    pub payload: Bytes,
    pub replace: bool,
    pub replace_victim: Option<String>,
}

impl LoadCommand {
    pub fn new(module_id: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            module_id: module_id.into(),
            payload: payload.into(),
            replace: false,
            replace_victim: None,
        }
    }

    /// Enable slot replacement, optionally naming the module to evict.
    ///
    /// The gateway forwards the policy verbatim; the device enforces it.
    pub fn with_replace(mut self, victim: Option<String>) -> Self {
        self.replace = true;
        self.replace_victim = victim;
        self
    }

    pub(crate) fn to_line(&self) -> String {
        let mut line = String::from("LOAD");
        push_field(&mut line, "module_id", &self.module_id);
        push_field(&mut line, "size", &self.payload.len().to_string());
        push_field(&mut line, "crc32", &crc32_hex(&self.payload));
        if self.replace || self.replace_victim.is_some() {
            push_field(&mut line, "replace", "1");
        }
        if let Some(victim) = &self.replace_victim {
            push_field(&mut line, "replace_victim", victim);
        }
        line
    }
}

/// Start a loaded module, optionally naming an entry function.
#[derive(Debug, Clone)]
pub struct StartCommand {
    pub module_id: String,
    /// Function to invoke; the device falls back to its default entry point.
    pub func_name: Option<String>,
    /// Arguments, passed with either an explicit function or the default.
    pub func_args: Option<String>,
    pub wait_result: bool,
    pub result_timeout: Duration,
}

impl StartCommand {
    pub fn new(module_id: impl Into<String>) -> Self {
        Self {
            module_id: module_id.into(),
            func_name: None,
            func_args: None,
            wait_result: false,
            result_timeout: Duration::from_secs(10),
        }
    }

    pub(crate) fn to_line(&self) -> String {
        let mut line = String::from("START");
        push_field(&mut line, "module_id", &self.module_id);
        if let Some(func) = &self.func_name {
            push_field(&mut line, "func", func);
        }
        if let Some(args) = &self.func_args {
            push_field(&mut line, "args", args);
        }
        line
    }
}

/// Stop a running module, waiting for its final RESULT if still pending.
#[derive(Debug, Clone)]
pub struct StopCommand {
    pub module_id: String,
    pub result_timeout: Duration,
}

impl StopCommand {
    pub fn new(module_id: impl Into<String>, result_timeout: Duration) -> Self {
        Self {
            module_id: module_id.into(),
            result_timeout,
        }
    }

    pub(crate) fn to_line(&self) -> String {
        let mut line = String::from("STOP");
        push_field(&mut line, "module_id", &self.module_id);
        line
    }
}

/// Append ` key=value`, double-quoting values containing spaces or `=`.
fn push_field(line: &mut String, key: &str, value: &str) {
    line.push(' ');
    line.push_str(key);
    line.push('=');
    if value.contains(' ') || value.contains('=') {
        line.push('"');
        line.push_str(value);
        line.push('"');
    } else {
        line.push_str(value);
    }
}
