//! Crash-safe file replacement.
//!
//! Data is written to a sibling temp file and renamed over the target, so a
//! reader only ever sees the previous complete file or the new one. Transient
//! failures (locked file, momentary disk pressure) are retried with
//! exponential backoff.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Attempts made before giving up.
pub const WRITE_ATTEMPTS: u32 = 3;
/// Delay before the first retry; doubled on each subsequent one.
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(10);

static NEXT_TEMP: AtomicU64 = AtomicU64::new(0);

/// A fresh temp path next to `path`.
///
/// Every call returns a different name, so concurrent writers of the same
/// target never share a temp file.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    let n = NEXT_TEMP.fetch_add(1, Ordering::Relaxed);
    name.push(format!(".{}-{n}.tmp", std::process::id()));
    path.with_file_name(name)
}

/// Writes `bytes` to `path` via temp file + rename, retrying on failure.
///
/// Returns the last error once all attempts are exhausted. The temp file is
/// removed on failure.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = temp_path(path);
    let mut backoff = INITIAL_BACKOFF;
    let mut attempt = 1;
    loop {
        let result = std::fs::write(&tmp, bytes).and_then(|()| std::fs::rename(&tmp, path));
        match result {
            Ok(()) => return Ok(()),
            Err(e) if attempt < WRITE_ATTEMPTS => {
                tracing::debug!(
                    path = %path.display(),
                    attempt,
                    "atomic write failed, retrying: {e}"
                );
                std::thread::sleep(backoff);
                backoff *= 2;
                attempt += 1;
            }
            Err(e) => {
                let _ = std::fs::remove_file(&tmp);
                return Err(e);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
