//! Isolated workspace provisioning

use crate::backend::Backend;
use crate::error::ProvisionError;
use dmake_codec::DatasetPath;
use std::path::{Path, PathBuf};

/// Prefix of workspace directory names
pub const WORKSPACE_PREFIX: &str = "dmake-";

/// A provisioned working tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    path: PathBuf,
    revision: String,
}

impl Workspace {
    /// Absolute path of the working tree
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Revision the working tree is pinned to
    #[inline]
    #[must_use]
    pub fn revision(&self) -> &str {
        &self.revision
    }
}

/// Creates and removes isolated working trees of a dataset
#[derive(Debug, Clone)]
pub struct Provisioner<B: Backend> {
    backend: B,
    workspace_root: PathBuf,
}

impl<B: Backend> Provisioner<B> {
    /// Provisioner placing workspaces in the system temp directory
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            workspace_root: std::env::temp_dir(),
        }
    }

    /// Place workspaces below `root`
    #[must_use]
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    /// Backend in use
    #[inline]
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Directory new workspaces are created in
    #[inline]
    #[must_use]
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Create a working tree of `dataset` at `revision` holding `inputs`
    ///
    /// The revision defaults to the dataset's current one. Besides `inputs`,
    /// only the methods directory is materialized.
    ///
    /// # Errors
    /// Returns an error if the revision is unknown, the working tree cannot be
    /// created or an input cannot be materialized. Nothing is left behind in
    /// that case.
    pub fn provision(
        &self,
        dataset: &Path,
        revision: Option<&str>,
        inputs: &[DatasetPath],
    ) -> Result<Workspace, ProvisionError> {
        let revision = self.backend.resolve_revision(dataset, revision)?;

        std::fs::create_dir_all(&self.workspace_root)
            .map_err(|e| ProvisionError::io_error(&self.workspace_root, e))?;
        let path = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(&self.workspace_root)
            .map_err(|e| ProvisionError::io_error(&self.workspace_root, e))?
            .keep();

        tracing::info!(
            dataset = %dataset.display(),
            workspace = %path.display(),
            revision = %revision,
            "provisioning workspace"
        );

        if let Err(err) = self.backend.create_worktree(dataset, &path, &revision) {
            let _ = std::fs::remove_dir_all(&path);
            return Err(err.into());
        }

        let workspace = Workspace { path, revision };
        if let Err(err) = self.backend.materialize(workspace.path(), inputs) {
            if let Err(cleanup) = self.un_provision(dataset, workspace.path()) {
                tracing::warn!(error = %cleanup, "failed to remove partial workspace");
            }
            return Err(err.into());
        }

        tracing::debug!(inputs = inputs.len(), "inputs materialized");
        Ok(workspace)
    }

    /// Provision and wrap the workspace in a guard removing it on drop
    ///
    /// # Errors
    /// Same as [`Provisioner::provision`].
    pub fn provision_scoped(
        &self,
        dataset: &Path,
        revision: Option<&str>,
        inputs: &[DatasetPath],
    ) -> Result<WorkspaceGuard<'_, B>, ProvisionError> {
        let workspace = self.provision(dataset, revision, inputs)?;
        Ok(WorkspaceGuard {
            provisioner: self,
            dataset: dataset.to_path_buf(),
            workspace: Some(workspace),
        })
    }

    /// Remove a working tree created by [`Provisioner::provision`]
    ///
    /// A path that does not exist is already removed.
    ///
    /// # Errors
    /// Returns `ProvisionError::NotAWorkspace` if `workspace` exists but is
    /// not a secondary working tree of `dataset`, or the backend error if
    /// removal fails.
    pub fn un_provision(&self, dataset: &Path, workspace: &Path) -> Result<(), ProvisionError> {
        if std::fs::symlink_metadata(workspace).is_err() {
            tracing::debug!(workspace = %workspace.display(), "workspace already gone");
            return Ok(());
        }

        let target = canonical(workspace);
        // the first entry is the primary working tree
        let worktrees = self.backend.list_worktrees(dataset)?;
        let owned = worktrees.iter().skip(1).any(|p| canonical(p) == target)
            && worktrees.first().map(|p| canonical(p)) != Some(target.clone());
        if !owned {
            return Err(ProvisionError::NotAWorkspace {
                dataset: dataset.to_path_buf(),
                workspace: workspace.to_path_buf(),
            });
        }

        self.backend.delete_worktree(dataset, workspace)?;
        if workspace.exists() {
            std::fs::remove_dir_all(workspace)
                .map_err(|e| ProvisionError::io_error(workspace, e))?;
        }
        tracing::info!(workspace = %workspace.display(), "workspace removed");
        Ok(())
    }
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Owns a workspace and removes it when dropped
///
/// [`WorkspaceGuard::release`] removes it explicitly and reports failure,
/// dropping only logs it.
#[derive(Debug)]
pub struct WorkspaceGuard<'a, B: Backend> {
    provisioner: &'a Provisioner<B>,
    dataset: PathBuf,
    workspace: Option<Workspace>,
}

impl<B: Backend> WorkspaceGuard<'_, B> {
    /// The guarded workspace
    #[must_use]
    pub fn path(&self) -> &Path {
        self.workspace
            .as_ref()
            .map_or_else(|| Path::new(""), Workspace::path)
    }

    /// Revision the workspace is pinned to
    #[must_use]
    pub fn revision(&self) -> &str {
        self.workspace.as_ref().map_or("", Workspace::revision)
    }

    /// Remove the workspace now
    ///
    /// # Errors
    /// Returns the teardown error.
    pub fn release(mut self) -> Result<(), ProvisionError> {
        match self.workspace.take() {
            Some(workspace) => self.provisioner.un_provision(&self.dataset, workspace.path()),
            None => Ok(()),
        }
    }
}

impl<B: Backend> Drop for WorkspaceGuard<'_, B> {
    fn drop(&mut self) {
        if let Some(workspace) = self.workspace.take() {
            if let Err(err) = self.provisioner.un_provision(&self.dataset, workspace.path()) {
                tracing::warn!(
                    workspace = %workspace.path().display(),
                    error = %err,
                    "failed to remove workspace"
                );
            }
        }
    }
}
