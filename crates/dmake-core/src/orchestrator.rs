//! Compute orchestration
//!
//! Runs a computation in an isolated workspace, collects its outputs into
//! the dataset and registers a provenance URL for every output.

use crate::config::ComputeConfig;
use crate::error::ComputeError;
use dmake_codec::{
    template_path, validate_method, CodecError, DatasetPath, Descriptor, Parameters,
};
use dmake_runner::TemplateRunner;
use dmake_workspace::{unlock_outputs, Backend, DatasetLock, Provisioner};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// One `dmake compute` invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComputeRequest {
    /// Dataset root
    pub dataset: PathBuf,
    /// Revision to compute from, current one when `None`
    pub branch: Option<String>,
    /// Template name below the methods directory
    pub method: String,
    /// Template parameters
    pub parameters: Parameters,
    /// Inline input paths
    pub inputs: Vec<DatasetPath>,
    /// Inline output paths
    pub outputs: Vec<DatasetPath>,
    /// File listing further inputs, one per line
    pub input_list: Option<PathBuf>,
    /// File listing further outputs, one per line
    pub output_list: Option<PathBuf>,
    /// Only register URLs, do not compute
    pub url_only: bool,
}

impl ComputeRequest {
    /// Request running `method` in `dataset`
    pub fn new(dataset: impl Into<PathBuf>, method: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            method: method.into(),
            ..Self::default()
        }
    }

    /// With revision
    #[must_use]
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// With parameters
    #[must_use]
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// With inline inputs
    #[must_use]
    pub fn with_inputs(mut self, inputs: Vec<DatasetPath>) -> Self {
        self.inputs = inputs;
        self
    }

    /// With inline outputs
    #[must_use]
    pub fn with_outputs(mut self, outputs: Vec<DatasetPath>) -> Self {
        self.outputs = outputs;
        self
    }

    /// With input list file
    #[must_use]
    pub fn with_input_list(mut self, path: impl Into<PathBuf>) -> Self {
        self.input_list = Some(path.into());
        self
    }

    /// With output list file
    #[must_use]
    pub fn with_output_list(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_list = Some(path.into());
        self
    }

    /// Register URLs only
    #[must_use]
    pub fn url_only(mut self, url_only: bool) -> Self {
        self.url_only = url_only;
        self
    }
}

/// Outcome of one status record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
}

/// Per-output result record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusRecord {
    /// Command that produced the record
    pub action: &'static str,
    /// Absolute path of the output
    pub path: PathBuf,
    /// Outcome
    pub status: Status,
    /// Human readable detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Registered provenance URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl StatusRecord {
    /// Successful registration of `url` for `path`
    pub fn registered(path: PathBuf, url: String) -> Self {
        Self {
            action: "compute",
            path,
            status: Status::Ok,
            message: None,
            url: Some(url),
        }
    }

    /// Failure record
    pub fn failed(path: PathBuf, message: impl Into<String>) -> Self {
        Self {
            action: "compute",
            path,
            status: Status::Error,
            message: Some(message.into()),
            url: None,
        }
    }
}

/// Read a list file: one dataset-relative path per line, blank lines skipped
///
/// Lines are taken as written apart from their line terminator, so paths may
/// begin or end with spaces.
///
/// # Errors
/// Returns `ComputeError::Io` if the file cannot be read, or
/// `ComputeError::InvalidInput` for an invalid path.
pub fn read_list_file(path: &Path) -> Result<Vec<DatasetPath>, ComputeError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ComputeError::io_error(path, e))?;
    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            line.parse::<DatasetPath>()
                .map_err(|e| ComputeError::from(CodecError::from(e)))
        })
        .collect()
}

/// Inline paths followed by those of the list file, duplicates kept
fn expand(inline: &[DatasetPath], list: Option<&Path>) -> Result<Vec<DatasetPath>, ComputeError> {
    let mut all = inline.to_vec();
    if let Some(list) = list {
        all.extend(read_list_file(list)?);
    }
    Ok(all)
}

/// Drives compute runs against one backend
#[derive(Debug, Clone)]
pub struct Orchestrator<B: Backend> {
    backend: B,
    runner: TemplateRunner,
    config: ComputeConfig,
}

impl<B: Backend> Orchestrator<B> {
    /// Orchestrator with default configuration
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            runner: TemplateRunner::new(),
            config: ComputeConfig::default(),
        }
    }

    /// With configuration
    #[must_use]
    pub fn with_config(mut self, config: ComputeConfig) -> Self {
        self.config = config;
        self
    }

    /// With template runner
    #[must_use]
    pub fn with_runner(mut self, runner: TemplateRunner) -> Self {
        self.runner = runner;
        self
    }

    /// Backend in use
    #[inline]
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run `request`, collecting the status records
    ///
    /// # Errors
    /// See [`Orchestrator::run_with`].
    pub fn run(&self, request: &ComputeRequest) -> Result<Vec<StatusRecord>, ComputeError> {
        let mut records = Vec::new();
        self.run_with(request, |record| records.push(record))?;
        Ok(records)
    }

    /// Run `request`, passing each status record to `emit` as it is produced
    ///
    /// Records emitted before a failure stay emitted.
    ///
    /// # Errors
    /// Any failing step aborts the run: an invalid method name or list file,
    /// provisioning, a failing computation, a missing output, commit or
    /// registration.
    pub fn run_with<F>(&self, request: &ComputeRequest, mut emit: F) -> Result<(), ComputeError>
    where
        F: FnMut(StatusRecord),
    {
        validate_method(&request.method)?;
        let dataset = request.dataset.as_path();
        let inputs = expand(&request.inputs, request.input_list.as_deref())?;
        let outputs = expand(&request.outputs, request.output_list.as_deref())?;
        tracing::info!(
            dataset = %dataset.display(),
            method = %request.method,
            inputs = inputs.len(),
            outputs = outputs.len(),
            url_only = request.url_only,
            "compute"
        );

        let _lock = DatasetLock::acquire(&self.backend.git_dir(dataset)?)?;
        let root_id = self.backend.dataset_id(dataset)?;

        let revision = if request.url_only {
            self.backend
                .resolve_revision(dataset, request.branch.as_deref())?
        } else {
            self.compute(request, &inputs, &outputs)?
        };

        let descriptor = Descriptor::new(root_id, revision, request.method.clone())
            .with_parameters(request.parameters.clone())
            .with_inputs(inputs)
            .with_outputs(outputs);
        let fingerprint = descriptor.fingerprint().short();

        for output in &descriptor.outputs {
            let url = descriptor.url_for(output);
            let file = output.to_path(dataset);
            self.backend
                .register_url(&file, &url, request.url_only)
                .map_err(|source| ComputeError::Registration {
                    path: output.clone(),
                    source,
                })?;
            tracing::info!(path = %output, fingerprint = %fingerprint, "registered");
            emit(StatusRecord::registered(file, url));
        }
        Ok(())
    }

    /// Provision, run, collect and commit; returns the revision computed from
    fn compute(
        &self,
        request: &ComputeRequest,
        inputs: &[DatasetPath],
        outputs: &[DatasetPath],
    ) -> Result<String, ComputeError> {
        let dataset = request.dataset.as_path();
        let provisioner =
            Provisioner::new(&self.backend).with_workspace_root(self.config.workspace_root());
        let workspace = provisioner.provision_scoped(dataset, request.branch.as_deref(), inputs)?;
        let worktree = workspace.path();

        unlock_outputs(&self.backend, worktree, outputs)?;
        let template = template_path(worktree, &request.method);
        self.runner.run(&template, &request.parameters, worktree)?;

        unlock_outputs(&self.backend, dataset, outputs)?;
        let mut collected = Vec::with_capacity(outputs.len());
        for output in outputs {
            let from = output.to_path(worktree);
            if std::fs::symlink_metadata(&from).is_err() {
                return Err(ComputeError::MissingOutput(output.clone()));
            }
            let to = output.to_path(dataset);
            if let Some(parent) = to.parent() {
                std::fs::create_dir_all(parent).map_err(|e| ComputeError::io_error(parent, e))?;
            }
            std::fs::copy(&from, &to).map_err(|e| ComputeError::io_error(&to, e))?;
            tracing::debug!(path = %output, "collected");
            collected.push(to);
        }

        self.backend
            .commit(dataset, &collected, &self.config.commit_message)?;

        let revision = workspace.revision().to_string();
        workspace.release()?;
        Ok(revision)
    }
}
