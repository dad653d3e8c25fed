use serde::{Deserialize, Serialize};

/// The single structured reply written back to the client.
///
/// Constructed once per request and never mutated after send. Exactly one
/// of `detail`/`error` is set depending on `ok`; `step` and the artifact
/// paths appear on build_and_load responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wasm_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aot_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl Response {
    /// Successful response with a detail line.
    pub fn ok(detail: impl Into<String>) -> Self {
        Self {
            ok: true,
            detail: Some(detail.into()),
            error: None,
            step: None,
            wasm_path: None,
            aot_path: None,
            stdout: None,
            stderr: None,
        }
    }

    /// Failed response with an error message.
    pub fn err(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            detail: None,
            error: Some(error.into()),
            step: None,
            wasm_path: None,
            aot_path: None,
            stdout: None,
            stderr: None,
        }
    }

    /// Tag the flow step that produced this response.
    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }

    /// Attach the intermediate .wasm artifact reference.
    pub fn with_wasm_path(mut self, path: impl Into<String>) -> Self {
        self.wasm_path = Some(path.into());
        self
    }

    /// Attach the .aot artifact reference.
    pub fn with_aot_path(mut self, path: impl Into<String>) -> Self {
        self.aot_path = Some(path.into());
        self
    }

    /// Attach captured toolchain diagnostics.
    pub fn with_diagnostics(mut self, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        self.stdout = Some(stdout.into());
        self.stderr = Some(stderr.into());
        self
    }

    /// Serialize as one newline-terminated JSON line.
    pub fn to_line(&self) -> String {
        let mut line =
            serde_json::to_string(self).unwrap_or_else(|_| r#"{"ok":false}"#.to_string());
        line.push('\n');
        line
    }

    /// Parse a response line received from the gateway.
    pub fn parse(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line.trim())
    }
}
