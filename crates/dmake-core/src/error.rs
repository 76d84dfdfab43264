//! Error types for dmake
//!
//! Every failure of a compute or retrieval run ends up as a [`ComputeError`]:
//! - malformed provenance (URLs, records, list files)
//! - a computation exiting unsuccessfully
//! - workspace provisioning or teardown
//! - registering a content location

use dmake_codec::{CodecError, DatasetPath};
use dmake_runner::RunnerError;
use dmake_workspace::{BackendError, ProvisionError};
use std::path::PathBuf;

/// Main dmake error type
#[derive(Debug, thiserror::Error)]
pub enum ComputeError {
    /// Provenance could not be decoded
    #[error(transparent)]
    MalformedRecord(CodecError),

    /// Invalid user input (paths, parameters)
    #[error("invalid input: {0}")]
    InvalidInput(#[source] CodecError),

    /// Template could not be run or exited unsuccessfully
    #[error(transparent)]
    Runner(#[from] RunnerError),

    /// Workspace could not be provisioned or removed
    #[error("provisioning failed: {0}")]
    Provision(#[from] ProvisionError),

    /// Dataset operation failed
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// Registering a content location failed
    #[error("failed to register url for {path}: {source}")]
    Registration {
        path: DatasetPath,
        #[source]
        source: BackendError,
    },

    /// Computation finished without producing a declared output
    #[error("computation did not produce {0}")]
    MissingOutput(DatasetPath),

    /// No provenance URL is registered for a key
    #[error("no provenance registered for key {0}")]
    NoProvenance(String),

    /// Filesystem operation failed
    #[error("io error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl ComputeError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Check if provenance was malformed
    #[inline]
    #[must_use]
    pub fn is_malformed_record(&self) -> bool {
        matches!(self, Self::MalformedRecord(_))
    }

    /// Check if the computation ran and failed
    #[inline]
    #[must_use]
    pub fn is_computation_failure(&self) -> bool {
        matches!(self, Self::Runner(err) if err.is_computation_failure())
    }

    /// Check if provisioning failed
    #[inline]
    #[must_use]
    pub fn is_provision_failure(&self) -> bool {
        matches!(self, Self::Provision(_))
    }

    /// Check if registration failed
    #[inline]
    #[must_use]
    pub fn is_registration_failure(&self) -> bool {
        matches!(self, Self::Registration { .. })
    }
}

impl From<CodecError> for ComputeError {
    fn from(err: CodecError) -> Self {
        if err.is_malformed_record() {
            Self::MalformedRecord(err)
        } else {
            Self::InvalidInput(err)
        }
    }
}
