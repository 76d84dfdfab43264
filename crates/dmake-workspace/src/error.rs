//! Error types for backends and workspace provisioning

use std::path::PathBuf;

/// Errors raised by a versioned file-tree backend
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Command ran and reported failure
    #[error("`{command}` failed ({status}): {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    /// Command could not be started
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Filesystem operation failed
    #[error("io error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Path is not inside a repository
    #[error("not inside a repository: {}", .0.display())]
    NotARepository(PathBuf),

    /// Dataset carries no identifier
    #[error("dataset at {} has no identifier", .0.display())]
    MissingDatasetId(PathBuf),

    /// Unknown revision
    #[error("unknown revision '{0}'")]
    UnknownRevision(String),
}

impl BackendError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create command failure from its captured output
    pub fn command_failed(command: impl Into<String>, output: &std::process::Output) -> Self {
        Self::CommandFailed {
            command: command.into(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }
}

/// Errors during workspace provisioning and teardown
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// Backend operation failed
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Filesystem operation failed
    #[error("io error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Path exists but is not a worktree of the dataset
    #[error("{} is not a workspace of dataset {}", .workspace.display(), .dataset.display())]
    NotAWorkspace { dataset: PathBuf, workspace: PathBuf },

    /// Dataset lock could not be taken
    #[error("failed to lock {}: {source}", .path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ProvisionError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Check if the backend reported the failure
    #[inline]
    #[must_use]
    pub fn is_backend(&self) -> bool {
        matches!(self, Self::Backend(_))
    }
}
