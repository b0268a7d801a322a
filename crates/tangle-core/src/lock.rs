//! Advisory file locks with bounded waits.
//!
//! Appends take an exclusive lock on the log file they write to. Materialize
//! takes a shared lock on a dedicated lock file, but only on a best-effort
//! basis: [`ReadLock::Skipped`] records why the read went ahead unlocked.

use crate::error::StoreError;
use fs2::FileExt;
use std::{
    fs::{self, File, OpenOptions},
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockKind {
    Shared,
    Exclusive,
}

/// RAII guard over a locked file handle. Unlocks on drop.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
    kind: LockKind,
}

impl FileLock {
    /// Open (creating if needed) a dedicated lock file and lock it.
    ///
    /// # Errors
    ///
    /// [`StoreError::LockTimeout`] when the lock is still held by someone else
    /// after `timeout`; an I/O classification otherwise.
    pub fn acquire(path: &Path, timeout: Duration, kind: LockKind) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| StoreError::from_io(&e, parent, "create directory"))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|e| StoreError::from_io(&e, path, "open lock file"))?;
        Self::lock(file, path, timeout, kind)
    }

    /// Lock an already-open handle, polling until `timeout` elapses.
    ///
    /// # Errors
    ///
    /// [`StoreError::LockTimeout`] if the lock cannot be taken in time.
    pub fn lock(
        file: File,
        path: &Path,
        timeout: Duration,
        kind: LockKind,
    ) -> Result<Self, StoreError> {
        let start = Instant::now();
        loop {
            // std's inherent `File::try_lock*` shadows fs2 on newer
            // toolchains and returns a different error type.
            let attempt = match kind {
                LockKind::Shared => FileExt::try_lock_shared(&file),
                LockKind::Exclusive => FileExt::try_lock_exclusive(&file),
            };

            if attempt.is_ok() {
                return Ok(Self {
                    file,
                    path: path.to_path_buf(),
                    kind,
                });
            }

            if start.elapsed() >= timeout {
                return Err(StoreError::LockTimeout {
                    path: path.to_path_buf(),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }

            thread::sleep(POLL_INTERVAL);
        }
    }

    /// The locked handle. Writes through it happen under the lock.
    pub const fn file(&self) -> &File {
        &self.file
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub const fn kind(&self) -> LockKind {
        self.kind
    }

    /// Explicitly release the lock. Release also happens automatically on drop.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Outcome of the best-effort shared lock taken by materialize.
#[derive(Debug)]
pub enum ReadLock {
    Acquired(FileLock),
    Skipped { reason: String },
}

impl ReadLock {
    /// Try to take a shared lock on `path`. Failure never propagates; it is
    /// logged and reported as [`ReadLock::Skipped`].
    pub fn try_shared(path: &Path, timeout: Duration) -> Self {
        match FileLock::acquire(path, timeout, LockKind::Shared) {
            Ok(lock) => Self::Acquired(lock),
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "read lock unavailable, materializing without it"
                );
                Self::Skipped {
                    reason: err.to_string(),
                }
            }
        }
    }

    pub const fn is_acquired(&self) -> bool {
        matches!(self, Self::Acquired(_))
    }
}
