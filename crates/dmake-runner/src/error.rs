//! Error types for template execution

use std::path::PathBuf;

/// Errors raised while loading or running a template
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// Template file does not exist
    #[error("template not found: {}", .0.display())]
    TemplateNotFound(PathBuf),

    /// Template file could not be read
    #[error("io error reading template {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Recipe template is not valid
    #[error("invalid recipe {}: {message}", .path.display())]
    InvalidRecipe { path: PathBuf, message: String },

    /// A `{name}` placeholder has no parameter
    #[error("unresolved placeholder '{{{name}}}' in '{format}'")]
    UnresolvedPlaceholder { name: String, format: String },

    /// Unbalanced braces in a format string
    #[error("malformed placeholder in '{0}'")]
    MalformedFormat(String),

    /// Process could not be started
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Process exited unsuccessfully
    #[error("computation {} failed: {status}", .template.display())]
    ComputationFailed { template: PathBuf, status: ExitState },
}

impl RunnerError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Check if the computation itself ran and failed
    #[inline]
    #[must_use]
    pub fn is_computation_failure(&self) -> bool {
        matches!(self, Self::ComputationFailed { .. })
    }
}

/// How a finished template process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitState(pub Option<i32>);

impl std::fmt::Display for ExitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(code) => write!(f, "exit status {code}"),
            None => f.write_str("terminated by signal"),
        }
    }
}
