//! On-disk side of the file cache: gzip-aware reads and atomic writes.
//!
//! A logical path `p` may be stored as `p` or as the compressed sibling
//! `p.gz`. Writers keep at most one of the two forms on disk.

use docket_core::constants::GZIP_EXTENSION;
use docket_core::FileCacheError;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::ffi::OsString;
use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tempfile::NamedTempFile;

/// `path` with `.gz` appended to its file name.
pub fn gz_sibling(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(GZIP_EXTENSION);
    PathBuf::from(name)
}

/// True if `path` names a gzip file.
pub fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == GZIP_EXTENSION)
}

/// `path` with a trailing `.gz` removed, naming the file both forms share.
pub fn logical_path(path: &Path) -> PathBuf {
    if is_gzip(path) {
        path.with_extension("")
    } else {
        path.to_path_buf()
    }
}

fn modified_time(path: &Path) -> Result<Option<SystemTime>, FileCacheError> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some(meta.modified().unwrap_or(SystemTime::UNIX_EPOCH))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(FileCacheError::io(path, e)),
    }
}

/// Parse the JSON stored at logical path `path`.
///
/// Reads `path` directly when it ends in `.gz`. Otherwise whichever of
/// `path` and `path.gz` exists is read; when both do, the more recently
/// modified one wins and ties go to the plaintext.
pub fn read_json(path: &Path) -> Result<serde_json::Value, FileCacheError> {
    if is_gzip(path) {
        return read_gz(path);
    }
    let sibling = gz_sibling(path);
    match (modified_time(path)?, modified_time(&sibling)?) {
        (None, None) => Err(FileCacheError::NotFound {
            path: path.to_path_buf(),
        }),
        (Some(plain), Some(packed)) if packed > plain => {
            tracing::debug!(path = %path.display(), "Both forms on disk, reading newer .gz");
            read_gz(&sibling)
        }
        (None, Some(_)) => read_gz(&sibling),
        (Some(_), _) => read_plain(path),
    }
}

fn read_plain(path: &Path) -> Result<serde_json::Value, FileCacheError> {
    let bytes = fs::read(path).map_err(|e| FileCacheError::io(path, e))?;
    parse(path, &bytes)
}

fn read_gz(path: &Path) -> Result<serde_json::Value, FileCacheError> {
    let file = fs::File::open(path).map_err(|e| FileCacheError::io(path, e))?;
    let mut bytes = Vec::new();
    GzDecoder::new(file)
        .read_to_end(&mut bytes)
        .map_err(|e| FileCacheError::Compression {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    parse(path, &bytes)
}

fn parse(path: &Path, bytes: &[u8]) -> Result<serde_json::Value, FileCacheError> {
    serde_json::from_slice(bytes).map_err(|e| FileCacheError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn gzip(path: &Path, bytes: &[u8]) -> Result<Vec<u8>, FileCacheError> {
    let compression_err = |e: std::io::Error| FileCacheError::Compression {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).map_err(compression_err)?;
    encoder.finish().map_err(compression_err)
}

/// Serialize `data` as pretty JSON, gzipped when `compress` is set.
pub fn encode(path: &Path, data: &serde_json::Value, compress: bool) -> Result<Vec<u8>, FileCacheError> {
    let json = serde_json::to_vec_pretty(data).map_err(|e| FileCacheError::Serialize {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    if compress {
        gzip(path, &json)
    } else {
        Ok(json)
    }
}

/// A fully written temporary file waiting to replace `dest`.
///
/// Dropping it without calling [`StagedWrite::commit`] deletes the
/// temporary file and leaves `dest` untouched.
#[derive(Debug)]
pub struct StagedWrite {
    temp: NamedTempFile,
    dest: PathBuf,
}

impl StagedWrite {
    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Path of the temporary file.
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    /// Atomically rename the temporary file over the destination.
    pub fn commit(self) -> Result<PathBuf, FileCacheError> {
        let Self { temp, dest } = self;
        temp.persist(&dest)
            .map_err(|e| FileCacheError::io(&dest, e.error))?;
        Ok(dest)
    }
}

/// Write `bytes` to a temporary file next to `dest` and flush it to disk.
pub fn stage_write(dest: &Path, bytes: &[u8]) -> Result<StagedWrite, FileCacheError> {
    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(dir).map_err(|e| FileCacheError::io(dir, e))?;
    temp.write_all(bytes)
        .map_err(|e| FileCacheError::io(temp.path(), e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| FileCacheError::io(temp.path(), e))?;
    Ok(StagedWrite {
        temp,
        dest: dest.to_path_buf(),
    })
}

fn remove_if_present(path: &Path) -> Result<(), FileCacheError> {
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "Removed stale copy");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(FileCacheError::io(path, e)),
    }
}

/// Atomically store `data` at logical path `path`.
///
/// With `compress` the bytes land in `path.gz` and a plaintext `path` is
/// removed; without it the reverse. Returns the file actually written.
///
/// Failing to remove the other form is logged, not returned: the committed
/// file is newer, so [`read_json`] already prefers it.
pub fn write_json_atomic(
    path: &Path,
    data: &serde_json::Value,
    compress: bool,
) -> Result<PathBuf, FileCacheError> {
    let (dest, stale) = if compress {
        (gz_sibling(path), path.to_path_buf())
    } else {
        (path.to_path_buf(), gz_sibling(path))
    };
    let bytes = encode(path, data, compress)?;
    let written = stage_write(&dest, &bytes)?.commit()?;
    if let Err(e) = remove_if_present(&stale) {
        tracing::warn!(path = %stale.display(), error = %e, "Stale copy left on disk");
    }
    Ok(written)
}

/// Replace plaintext `path` with a gzipped `path.gz`.
///
/// The compressed copy is committed before the plaintext is deleted, so an
/// interruption leaves at least one readable form.
pub fn compress_in_place(path: &Path) -> Result<PathBuf, FileCacheError> {
    let plain = fs::read(path).map_err(|e| FileCacheError::io(path, e))?;
    let packed = gzip(path, &plain)?;
    let written = stage_write(&gz_sibling(path), &packed)?.commit()?;
    remove_if_present(path)?;
    Ok(written)
}
