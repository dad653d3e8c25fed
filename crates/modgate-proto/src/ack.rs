/// Fixed prefix vocabulary of device acknowledgment lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckKind {
    LoadReady,
    LoadOk,
    LoadErr,
    StartOk,
    StopOk,
    Result,
    Error,
    Status,
}

impl AckKind {
    /// The line prefix this ack is recognized by.
    pub fn prefix(self) -> &'static str {
        match self {
            AckKind::LoadReady => "LOAD_READY",
            AckKind::LoadOk => "LOAD_OK",
            AckKind::LoadErr => "LOAD_ERR",
            AckKind::StartOk => "START_OK",
            AckKind::StopOk => "STOP_OK",
            AckKind::Result => "RESULT",
            AckKind::Error => "ERROR",
            AckKind::Status => "STATUS",
        }
    }
}

/// Classify a received line against an ordered candidate list.
///
/// First match wins. A line matching none of the candidates is not an
/// error; the caller discards it and keeps waiting.
pub fn classify(line: &str, candidates: &[AckKind]) -> Option<AckKind> {
    candidates
        .iter()
        .copied()
        .find(|kind| line.starts_with(kind.prefix()))
}

/// Whether a RESULT-bearing line reports success.
pub fn status_is_ok(line: &str) -> bool {
    line.contains("status=OK")
}

/// Whether an ack line reports a still-running module.
pub fn status_is_pending(line: &str) -> bool {
    line.contains("status=PENDING")
}
