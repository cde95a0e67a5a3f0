//! Cold-storage scan for the file cache.

use docket_core::FileCacheError;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;

/// Result of one `optimize_directory` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompactionReport {
    /// `*.json` files examined.
    pub scanned: usize,
    /// Plaintext files replaced by a `.gz` sibling.
    pub compressed: Vec<PathBuf>,
    /// Files skipped because of an I/O error.
    pub errors: usize,
}

/// Plaintext `*.json` files under `dir` not accessed within `max_age`.
///
/// Uses the on-disk access time, falling back to the modification time on
/// filesystems that do not record it. Returns the scanned count, the cold
/// files, and the number of entries that could not be inspected.
pub(crate) fn find_cold_files(
    dir: &Path,
    max_age: Duration,
) -> Result<(usize, Vec<PathBuf>, usize), FileCacheError> {
    if !dir.is_dir() {
        return Err(FileCacheError::NotFound {
            path: dir.to_path_buf(),
        });
    }

    let now = SystemTime::now();
    let mut scanned = 0;
    let mut cold = Vec::new();
    let mut errors = 0;

    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "Skipping unreadable entry");
                errors += 1;
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().map_or(true, |ext| ext != "json") {
            continue;
        }
        scanned += 1;

        let touched = entry
            .metadata()
            .map_err(std::io::Error::from)
            .and_then(|meta| meta.accessed().or_else(|_| meta.modified()));
        match touched {
            Ok(touched) => {
                let age = now.duration_since(touched).unwrap_or(Duration::ZERO);
                if age > max_age {
                    cold.push(path.to_path_buf());
                }
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Cannot read file times");
                errors += 1;
            }
        }
    }

    cold.sort();
    Ok((scanned, cold, errors))
}
