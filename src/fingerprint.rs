//! Content fingerprints for change detection.
//!
//! A fingerprint is the SHA-256 of a file's raw bytes, hex encoded. It
//! changes if and only if the bytes change, and it is embedded in every
//! chunk's metadata as the identity of the document it came from.

use sha2::{Digest, Sha256};
use std::path::Path;

/// Fingerprint the file at `path`.
///
/// Returns an empty string when the file cannot be read so that callers
/// walking a directory can keep going past unreadable files.
pub fn fingerprint_file(path: &Path) -> String {
    match std::fs::read(path) {
        Ok(bytes) => fingerprint_bytes(&bytes),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "could not fingerprint file");
            String::new()
        }
    }
}

pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
