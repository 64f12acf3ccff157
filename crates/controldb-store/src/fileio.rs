//! Checksummed record files
//!
//! File format:
//! ```text
//! +----------------+------------------------+
//! | MD5 (16 bytes) | payload (prost bytes)  |
//! +----------------+------------------------+
//! ```
//!
//! `write_record` never publishes anything: callers write to a temp path
//! and rename it into place, removing the temp file if the write fails.

use controldb_common::{CHECKSUM_BYTES, DbError, DbResult, record_checksum};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Suffix of per-record temp files
pub const TMP_FILE_SUFFIX: &str = ".tmp";

/// Write `payload` behind its checksum to `path`, truncating any existing
/// file, and sync it before returning.
pub fn write_record(path: &Path, payload: &[u8]) -> DbResult<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|e| DbError::internal(format!("open {} for write: {e}", path.display())))?;

    let checksum = record_checksum(payload);
    let mut buf = Vec::with_capacity(CHECKSUM_BYTES + payload.len());
    buf.extend_from_slice(&checksum);
    buf.extend_from_slice(payload);

    file.write_all(&buf)
        .map_err(|e| DbError::internal(format!("write {}: {e}", path.display())))?;
    file.sync_all()
        .map_err(|e| DbError::internal(format!("sync {}: {e}", path.display())))?;

    debug!("Wrote record {} ({} bytes)", path.display(), payload.len());
    Ok(())
}

/// Read a record file and return its payload after verifying the checksum.
pub fn read_record(path: &Path) -> DbResult<Vec<u8>> {
    let data = fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            DbError::not_found(path.display().to_string())
        } else {
            DbError::internal(format!("read {}: {e}", path.display()))
        }
    })?;

    // An empty payload (e.g. an empty list) is a bare header.
    if data.len() < CHECKSUM_BYTES {
        return Err(DbError::internal(format!(
            "record {} is truncated ({} bytes)",
            path.display(),
            data.len()
        )));
    }

    let (stored, payload) = data.split_at(CHECKSUM_BYTES);
    if stored != record_checksum(payload) {
        warn!("Checksum mismatch in {}", path.display());
        return Err(DbError::internal(format!(
            "record {} is corrupted: checksum mismatch",
            path.display()
        )));
    }

    Ok(payload.to_vec())
}

/// Temp path used while writing `path`
#[must_use]
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(TMP_FILE_SUFFIX);
    PathBuf::from(name)
}

/// Write a record through `<path>.tmp` and rename it over `path`.
///
/// Used for per-record files that have no version history; an existing
/// file at `path` is replaced.
pub fn write_record_atomic(path: &Path, payload: &[u8]) -> DbResult<()> {
    let tmp = tmp_path(path);
    if let Err(e) = write_record(&tmp, payload) {
        remove_quietly(&tmp);
        return Err(e);
    }
    if let Err(e) = fs::rename(&tmp, path) {
        remove_quietly(&tmp);
        return Err(DbError::internal(format!(
            "rename {} to {}: {e}",
            tmp.display(),
            path.display()
        )));
    }
    Ok(())
}

/// Remove a record file; a missing file is `RecordNotFound`.
pub fn remove_record(path: &Path) -> DbResult<()> {
    fs::remove_file(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            DbError::not_found(path.display().to_string())
        } else {
            DbError::internal(format!("remove {}: {e}", path.display()))
        }
    })
}

/// Best-effort cleanup of a leftover temp file
pub fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!("Failed to remove temp file {}: {}", path.display(), e);
    }
}

/// True for crash leftovers written through `write_record_atomic`
#[must_use]
pub fn is_tmp_file(name: &str) -> bool {
    name.ends_with(TMP_FILE_SUFFIX)
}

/// Create `dir` and its parents if missing
pub fn ensure_dir(dir: &Path) -> DbResult<()> {
    fs::create_dir_all(dir)
        .map_err(|e| DbError::internal(format!("create dir {}: {e}", dir.display())))
}
