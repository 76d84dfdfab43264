//! Configuration for compute and retrieval runs

use crate::error::ComputeError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Dataset-relative location of the configuration file
pub const CONFIG_FILE: &str = ".datalad/compute/config.toml";

/// Environment variable overriding the workspace root
pub const WORKSPACE_ROOT_ENV: &str = "DMAKE_WORKSPACE_ROOT";

/// Configuration of a dataset's computations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ComputeConfig {
    /// Directory workspaces are created in (system temp dir when unset)
    pub workspace_root: Option<PathBuf>,
    /// Message of commits recording computed outputs
    pub commit_message: String,
    /// Logging settings
    pub log: LogConfig,
    /// Special remote settings
    pub remote: RemoteConfig,
}

impl ComputeConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `<dataset>/.datalad/compute/config.toml`, defaults when absent
    ///
    /// The `DMAKE_WORKSPACE_ROOT` environment variable overrides the file.
    ///
    /// # Errors
    /// Returns `ComputeError::Config` if the file exists but does not parse.
    pub fn load(dataset: &Path) -> Result<Self, ComputeError> {
        let path = dataset.join(CONFIG_FILE);
        let config = match std::fs::read_to_string(&path) {
            Ok(raw) => Self::from_toml(&raw)
                .map_err(|e| ComputeError::Config(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => return Err(ComputeError::io_error(path, e)),
        };
        tracing::debug!(config = ?config, "configuration loaded");
        Ok(config.with_env_overrides())
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    /// Returns `ComputeError::Config` on invalid TOML or unknown fields.
    pub fn from_toml(raw: &str) -> Result<Self, ComputeError> {
        toml::from_str(raw).map_err(|e| ComputeError::Config(e.to_string()))
    }

    /// Apply environment overrides
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(root) = std::env::var_os(WORKSPACE_ROOT_ENV).filter(|v| !v.is_empty()) {
            self.workspace_root = Some(PathBuf::from(root));
        }
        self
    }

    /// With workspace root
    #[inline]
    #[must_use]
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    /// With commit message
    #[inline]
    #[must_use]
    pub fn with_commit_message(mut self, message: impl Into<String>) -> Self {
        self.commit_message = message.into();
        self
    }

    /// With special remote cost
    #[inline]
    #[must_use]
    pub fn with_remote_cost(mut self, cost: u32) -> Self {
        self.remote.cost = cost;
        self
    }

    /// Directory workspaces are created in
    #[must_use]
    pub fn workspace_root(&self) -> PathBuf {
        self.workspace_root.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            workspace_root: None,
            commit_message: "[dmake] record computed outputs".to_string(),
            log: LogConfig::default(),
            remote: RemoteConfig::default(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// Default filter directive when `DMAKE_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of text
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Special remote settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteConfig {
    /// Cost reported to git-annex
    pub cost: u32,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self { cost: 100 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let config = ComputeConfig::new();
        assert_eq!(config.remote.cost, 100);
        assert_eq!(config.log.level, "info");
        assert!(!config.log.json);
        assert_eq!(config.workspace_root(), std::env::temp_dir());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config = ComputeConfig::from_toml(
            "workspace_root = \"/scratch\"\n\n[remote]\ncost = 250\n",
        )
        .unwrap();
        assert_eq!(config.workspace_root(), PathBuf::from("/scratch"));
        assert_eq!(config.remote.cost, 250);
        assert_eq!(config.commit_message, ComputeConfig::default().commit_message);
    }

    #[test]
    fn unknown_fields_rejected() {
        let err = ComputeConfig::from_toml("workers = 4\n").unwrap_err();
        assert!(matches!(err, ComputeError::Config(_)));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ComputeConfig::load(dir.path()).unwrap();
        assert_eq!(config.remote, RemoteConfig::default());
    }

    #[test]
    fn builders() {
        let config = ComputeConfig::new()
            .with_workspace_root("/w")
            .with_commit_message("m")
            .with_remote_cost(7);
        assert_eq!(config.workspace_root, Some(PathBuf::from("/w")));
        assert_eq!(config.commit_message, "m");
        assert_eq!(config.remote.cost, 7);
    }
}
