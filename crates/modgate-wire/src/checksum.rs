use crate::error::{Result, WireError};

/// CRC-32 of `data`, rendered as 8 lowercase hex digits.
pub fn crc32_hex(data: &[u8]) -> String {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    format!("{:08x}", hasher.finalize())
}

/// Check a declared checksum against the payload, case-insensitively.
///
/// The declared value is what the client claimed; the computed value is
/// what actually arrived. A mismatch means the transfer was corrupted and
/// the payload must not be forwarded to the device.
pub fn verify_crc32(data: &[u8], declared: &str) -> Result<()> {
    let expected = declared.trim().to_ascii_lowercase();
    let got = crc32_hex(data);
    if got != expected {
        return Err(WireError::ChecksumMismatch { expected, got });
    }
    Ok(())
}
