//! Per-dataset advisory lock

use crate::error::ProvisionError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Lock file name inside the repository metadata directory
pub const LOCK_FILE: &str = "dmake.lock";

/// Exclusive advisory lock serializing computations on one dataset
///
/// Released when dropped.
#[derive(Debug)]
pub struct DatasetLock {
    file: File,
    path: PathBuf,
}

impl DatasetLock {
    /// Take the lock in `git_dir`, waiting for other holders
    ///
    /// # Errors
    /// Returns `ProvisionError::Lock` if the lock file cannot be opened or locked.
    pub fn acquire(git_dir: &Path) -> Result<Self, ProvisionError> {
        let path = git_dir.join(LOCK_FILE);
        let lock_error = |source| ProvisionError::Lock {
            path: path.clone(),
            source,
        };

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(lock_error)?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {}
            Err(err) if err.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                tracing::info!(lock = %path.display(), "waiting for another computation");
                FileExt::lock_exclusive(&file).map_err(lock_error)?;
            }
            Err(err) => return Err(lock_error(err)),
        }

        tracing::debug!(lock = %path.display(), "dataset locked");
        Ok(Self { file, path })
    }

    /// Location of the lock file
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DatasetLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            tracing::warn!(lock = %self.path.display(), error = %err, "failed to release lock");
        }
    }
}
