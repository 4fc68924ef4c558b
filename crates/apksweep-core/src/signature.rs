//! Archive signature check.
//!
//! Targets are ZIP containers (APK), whose first two bytes are `PK`.

use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Leading bytes every accepted archive starts with.
pub const ARCHIVE_SIGNATURE: &[u8] = b"PK";

/// Number of leading bytes inspected from a response or file.
pub const INSPECT_LEN: usize = 8;

pub fn matches_signature(bytes: &[u8]) -> bool {
    bytes.starts_with(ARCHIVE_SIGNATURE)
}

/// Reads the first bytes of `path` and checks them against the signature.
pub fn file_matches_signature(path: &Path) -> std::io::Result<bool> {
    let mut f = File::open(path)?;
    let mut buf = [0u8; INSPECT_LEN];
    let mut filled = 0;
    while filled < buf.len() {
        let n = f.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(matches_signature(&buf[..filled]))
}
