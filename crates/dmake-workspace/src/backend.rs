//! Versioned file-tree backend interface

use crate::error::BackendError;
use dmake_codec::DatasetPath;
use std::path::{Path, PathBuf};

/// Operations on a versioned dataset that provisioning and collection need
///
/// Paths named `dataset` and `worktree` are repository roots. Paths named
/// `file` are absolute and may lie inside a nested repository.
pub trait Backend {
    /// Resolve `revision` (or the current one when `None`) to an immutable id
    ///
    /// # Errors
    /// Returns `BackendError::UnknownRevision` if the revision does not exist.
    fn resolve_revision(&self, dataset: &Path, revision: Option<&str>)
        -> Result<String, BackendError>;

    /// Root of the innermost repository containing `path`
    ///
    /// # Errors
    /// Returns `BackendError::NotARepository` if `path` is outside any repository.
    fn toplevel(&self, path: &Path) -> Result<PathBuf, BackendError>;

    /// Absolute path of the repository's metadata directory
    ///
    /// # Errors
    /// Returns an error if the directory cannot be determined.
    fn git_dir(&self, dataset: &Path) -> Result<PathBuf, BackendError>;

    /// Stable identifier of the dataset
    ///
    /// # Errors
    /// Returns `BackendError::MissingDatasetId` if none is configured.
    fn dataset_id(&self, dataset: &Path) -> Result<String, BackendError>;

    /// Check out `revision` of `dataset` as a new working tree at `worktree`
    ///
    /// # Errors
    /// Returns an error if the working tree cannot be created.
    fn create_worktree(
        &self,
        dataset: &Path,
        worktree: &Path,
        revision: &str,
    ) -> Result<(), BackendError>;

    /// Make the content of `paths` available inside `worktree`
    ///
    /// # Errors
    /// Returns an error if any content cannot be obtained.
    fn materialize(&self, worktree: &Path, paths: &[DatasetPath]) -> Result<(), BackendError>;

    /// Turn a locked file into a writable one
    ///
    /// # Errors
    /// Returns an error if the file cannot be unlocked.
    fn unlock(&self, file: &Path) -> Result<(), BackendError>;

    /// Record `files` in their repositories, innermost repository first
    ///
    /// # Errors
    /// Returns an error if any repository fails to commit.
    fn commit(&self, dataset: &Path, files: &[PathBuf], message: &str) -> Result<(), BackendError>;

    /// Working trees attached to `dataset`, the primary one included
    ///
    /// # Errors
    /// Returns an error if the list cannot be read.
    fn list_worktrees(&self, dataset: &Path) -> Result<Vec<PathBuf>, BackendError>;

    /// Remove the working tree at `worktree` and its content
    ///
    /// # Errors
    /// Returns an error if removal fails.
    fn delete_worktree(&self, dataset: &Path, worktree: &Path) -> Result<(), BackendError>;

    /// Register `url` as a content location of `file`
    ///
    /// With `relaxed` the location is recorded without fetching content.
    ///
    /// # Errors
    /// Returns an error if registration fails.
    fn register_url(&self, file: &Path, url: &str, relaxed: bool) -> Result<(), BackendError>;
}

impl<B: Backend + ?Sized> Backend for &B {
    fn resolve_revision(
        &self,
        dataset: &Path,
        revision: Option<&str>,
    ) -> Result<String, BackendError> {
        (**self).resolve_revision(dataset, revision)
    }

    fn toplevel(&self, path: &Path) -> Result<PathBuf, BackendError> {
        (**self).toplevel(path)
    }

    fn git_dir(&self, dataset: &Path) -> Result<PathBuf, BackendError> {
        (**self).git_dir(dataset)
    }

    fn dataset_id(&self, dataset: &Path) -> Result<String, BackendError> {
        (**self).dataset_id(dataset)
    }

    fn create_worktree(
        &self,
        dataset: &Path,
        worktree: &Path,
        revision: &str,
    ) -> Result<(), BackendError> {
        (**self).create_worktree(dataset, worktree, revision)
    }

    fn materialize(&self, worktree: &Path, paths: &[DatasetPath]) -> Result<(), BackendError> {
        (**self).materialize(worktree, paths)
    }

    fn unlock(&self, file: &Path) -> Result<(), BackendError> {
        (**self).unlock(file)
    }

    fn commit(&self, dataset: &Path, files: &[PathBuf], message: &str) -> Result<(), BackendError> {
        (**self).commit(dataset, files, message)
    }

    fn list_worktrees(&self, dataset: &Path) -> Result<Vec<PathBuf>, BackendError> {
        (**self).list_worktrees(dataset)
    }

    fn delete_worktree(&self, dataset: &Path, worktree: &Path) -> Result<(), BackendError> {
        (**self).delete_worktree(dataset, worktree)
    }

    fn register_url(&self, file: &Path, url: &str, relaxed: bool) -> Result<(), BackendError> {
        (**self).register_url(file, url, relaxed)
    }
}
