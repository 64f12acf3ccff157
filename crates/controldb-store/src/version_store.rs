//! Versioned file store
//!
//! One logical object is kept as a sequence of immutable version files
//! inside a dedicated directory:
//!
//! ```text
//! <dir>/
//!   device.v0000000000000007   <- first retained version
//!   ...
//!   device.v0000000000000011   <- current version
//!   device.tmp1712345678901    <- in-flight write, renamed into place
//! ```
//!
//! Every write creates `current + 1`. Once more than `max_versions`
//! versions trail the current one, a background thread removes the oldest.
//! The store is not thread-safe for writers: its owner serializes access.

use crate::fileio::{self, TMP_FILE_SUFFIX};
use controldb_common::{DbError, DbResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

/// Sentinel for "no version on disk"
const NO_VERSION: i64 = -1;

/// Kind of object kept in a version store; decides the file name prefixes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VersionFileType {
    Device,
    Service,
    ServiceAttr,
}

impl VersionFileType {
    /// Prefix of version file names
    #[must_use]
    pub const fn version_prefix(self) -> &'static str {
        match self {
            Self::Device => "device.v",
            Self::Service => "service.v",
            Self::ServiceAttr => "attr.v",
        }
    }

    /// Prefix of temp file names
    #[must_use]
    pub const fn tmp_prefix(self) -> &'static str {
        match self {
            Self::Device => "device.tmp",
            Self::Service => "service.tmp",
            Self::ServiceAttr => "attr.tmp",
        }
    }
}

/// Append-only sequence of version files for one object
pub struct VersionFileStore {
    file_type: VersionFileType,
    dir: PathBuf,
    max_versions: i64,
    /// Shared with the compaction thread, which advances it
    first_version: Arc<AtomicI64>,
    current_version: i64,
    compacting: Arc<AtomicBool>,
    compaction_handle: Option<JoinHandle<()>>,
}

impl VersionFileStore {
    /// Open (creating if needed) the store under `dir` and recover its
    /// version range from the file names found there.
    pub fn open(file_type: VersionFileType, dir: impl AsRef<Path>, max_versions: i64) -> DbResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fileio::ensure_dir(&dir)?;

        let mut store = Self {
            file_type,
            dir,
            max_versions,
            first_version: Arc::new(AtomicI64::new(NO_VERSION)),
            current_version: NO_VERSION,
            compacting: Arc::new(AtomicBool::new(false)),
            compaction_handle: None,
        };
        store.recover()?;
        store.maybe_start_compaction();
        Ok(store)
    }

    fn recover(&mut self) -> DbResult<()> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| DbError::internal(format!("read dir {}: {e}", self.dir.display())))?;

        let version_prefix = self.file_type.version_prefix();
        let tmp_prefix = self.file_type.tmp_prefix();
        let mut first = NO_VERSION;
        let mut current = NO_VERSION;

        for entry in entries {
            let entry = entry
                .map_err(|e| DbError::internal(format!("read dir {}: {e}", self.dir.display())))?;
            let name = entry.file_name().to_string_lossy().into_owned();

            if name.starts_with(tmp_prefix) || name.ends_with(TMP_FILE_SUFFIX) {
                info!("Removing leftover temp file {}", entry.path().display());
                fileio::remove_quietly(&entry.path());
                continue;
            }

            let Some(suffix) = name.strip_prefix(version_prefix) else {
                continue;
            };
            let version = i64::from_str_radix(suffix, 16).map_err(|e| {
                error!("Bad version file name {} in {}: {}", name, self.dir.display(), e);
                DbError::internal(format!("bad version file name {name}"))
            })?;

            if first == NO_VERSION || version < first {
                first = version;
            }
            if current == NO_VERSION || version > current {
                current = version;
            }
        }

        self.first_version.store(first, Ordering::SeqCst);
        self.current_version = current;

        info!(
            "Recovered {} first version {} current version {}",
            self.dir.display(),
            first,
            current
        );
        Ok(())
    }

    /// Store directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub const fn has_current_version(&self) -> bool {
        self.current_version != NO_VERSION
    }

    #[must_use]
    pub const fn current_version(&self) -> i64 {
        self.current_version
    }

    #[must_use]
    pub fn first_version(&self) -> i64 {
        self.first_version.load(Ordering::SeqCst)
    }

    fn version_path(&self, version: i64) -> PathBuf {
        version_file_path(&self.dir, self.file_type, version)
    }

    fn tmp_file_path(&self) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos());
        self.dir
            .join(format!("{}{}", self.file_type.tmp_prefix(), nanos))
    }

    /// Payload of the highest-numbered version.
    ///
    /// Any failure here means the directory is inconsistent and is
    /// reported as an internal error.
    pub fn read_current_version(&self) -> DbResult<Vec<u8>> {
        if !self.has_current_version() {
            return Err(DbError::not_found(format!(
                "no version in {}",
                self.dir.display()
            )));
        }
        let path = self.version_path(self.current_version);
        fileio::read_record(&path).map_err(|e| match e {
            DbError::Internal(_) => e,
            other => DbError::internal(format!("read {}: {other}", path.display())),
        })
    }

    /// Write `data` as version `current + 1`.
    pub fn create_new_version(&mut self, data: &[u8]) -> DbResult<i64> {
        let tmp = self.tmp_file_path();
        if let Err(e) = fileio::write_record(&tmp, data) {
            fileio::remove_quietly(&tmp);
            return Err(e);
        }

        let new_version = self.current_version + 1;
        let target = self.version_path(new_version);
        if target.exists() {
            fileio::remove_quietly(&tmp);
            error!(
                "Version file {} already exists, concurrent writer detected",
                target.display()
            );
            return Err(DbError::internal(format!(
                "version file {} already exists",
                target.display()
            )));
        }
        if let Err(e) = fs::rename(&tmp, &target) {
            fileio::remove_quietly(&tmp);
            return Err(DbError::internal(format!(
                "rename {} to {}: {e}",
                tmp.display(),
                target.display()
            )));
        }

        self.current_version = new_version;
        if self.first_version() == NO_VERSION {
            if new_version != 0 {
                warn!(
                    "First version in {} is {}, expected 0",
                    self.dir.display(),
                    new_version
                );
            }
            self.first_version.store(new_version, Ordering::SeqCst);
        }

        debug!("Created version {} in {}", new_version, self.dir.display());
        self.maybe_start_compaction();
        Ok(new_version)
    }

    fn needs_compaction(&self) -> bool {
        let first = self.first_version();
        first != NO_VERSION && self.current_version - first > self.max_versions
    }

    /// Start background removal of versions beyond the retention window,
    /// unless one is already running.
    fn maybe_start_compaction(&mut self) {
        if !self.needs_compaction() {
            return;
        }
        if self
            .compacting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Compaction already running for {}", self.dir.display());
            return;
        }
        // The previous thread has cleared the flag, so joining is immediate.
        if let Some(handle) = self.compaction_handle.take() {
            let _ = handle.join();
        }

        let start = self.first_version();
        let end = self.current_version - self.max_versions;
        let dir = self.dir.clone();
        let file_type = self.file_type;
        let first_version = Arc::clone(&self.first_version);
        let compacting = Arc::clone(&self.compacting);

        let spawned = thread::Builder::new()
            .name("controldb-compact".to_string())
            .spawn(move || {
                compact(&dir, file_type, start, end, &first_version);
                compacting.store(false, Ordering::SeqCst);
            });

        match spawned {
            Ok(handle) => self.compaction_handle = Some(handle),
            Err(e) => {
                warn!("Failed to spawn compaction for {}: {}", self.dir.display(), e);
                self.compacting.store(false, Ordering::SeqCst);
            }
        }
    }

    /// Block until no compaction is running and the retention window holds.
    pub fn wait_for_compaction(&mut self) {
        let mut last_first = NO_VERSION;
        loop {
            if let Some(handle) = self.compaction_handle.take() {
                let _ = handle.join();
            }
            let first = self.first_version();
            // Stop when a pass made no progress, e.g. on a removal error.
            if !self.needs_compaction() || first == last_first {
                return;
            }
            last_first = first;
            self.maybe_start_compaction();
            if self.compaction_handle.is_none() {
                return;
            }
        }
    }

    /// Remove the whole store directory.
    pub fn delete_all(&mut self) -> DbResult<()> {
        if let Some(handle) = self.compaction_handle.take() {
            let _ = handle.join();
        }
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(DbError::internal(format!(
                    "remove dir {}: {e}",
                    self.dir.display()
                )));
            }
        }
        self.first_version.store(NO_VERSION, Ordering::SeqCst);
        self.current_version = NO_VERSION;
        info!("Deleted version store {}", self.dir.display());
        Ok(())
    }
}

fn version_file_path(dir: &Path, file_type: VersionFileType, version: i64) -> PathBuf {
    dir.join(format!("{}{:016x}", file_type.version_prefix(), version))
}

/// Remove versions `[start, end)`, advancing `first_version` after each.
/// Already-missing files count as removed.
fn compact(dir: &Path, file_type: VersionFileType, start: i64, end: i64, first_version: &AtomicI64) {
    debug!("Compacting {} versions {}..{}", dir.display(), start, end);
    for version in start..end {
        let path = version_file_path(dir, file_type, version);
        match fs::remove_file(&path) {
            Ok(()) => debug!("Removed {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("{} already removed", path.display());
            }
            Err(e) => {
                warn!("Compaction failed to remove {}: {}", path.display(), e);
                return;
            }
        }
        first_version.store(version + 1, Ordering::SeqCst);
    }
    info!("Compacted {} up to version {}", dir.display(), end);
}
