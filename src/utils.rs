//! Utility functions for colman
//!
//! Hashing, human-readable sizes and the atomic write used by the local
//! store.
//!
//! ## Example Usage
//!
//! ```rust
//! use colman::format_bytes;
//!
//! assert_eq!(format_bytes(1536), "1.50 KB");
//! ```
//!
//! ## Thread Safety
//!
//! All utility functions are thread-safe and can be called concurrently from
//! multiple threads without synchronization.

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::trace;

/// Compute the SHA-256 hash of arbitrary data
///
/// Returns the lowercase hex digest (64 characters).
pub fn hash_data(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Format a byte count for display, e.g. `1.50 KB`
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Write `content` to `path` atomically
///
/// The data goes to a temporary file in the same directory which is synced
/// and then renamed over `path`, so readers see either the old or the new
/// content, never a torn write.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    trace!("Atomically wrote {} bytes to {:?}", content.len(), path);
    Ok(())
}

/// First eight characters of an identifier, for display
pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
