//! Template execution

use crate::error::{ExitState, RunnerError};
use crate::template::{Invocation, Template};
use dmake_codec::Parameters;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Result of a successful template run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Program that was executed
    pub program: String,
    /// Arguments it received
    pub arguments: Vec<String>,
    /// Wall-clock duration of the process
    pub duration: Duration,
}

/// Executes templates as child processes
///
/// The child inherits the environment and stderr. Its stdout is sent to
/// stderr because stdout of the calling process may carry a protocol.
/// Stdin is closed.
#[derive(Debug, Clone, Default)]
pub struct TemplateRunner {
    env: Vec<(String, String)>,
}

impl TemplateRunner {
    /// Create a runner
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an extra environment variable for every run
    #[must_use]
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((name.into(), value.into()));
        self
    }

    /// Run the template at `template` with `params` in `cwd`
    ///
    /// Blocks until the process exits. There is no timeout.
    ///
    /// # Errors
    /// - template loading and placeholder errors from [`Template`]
    /// - `RunnerError::Spawn` if the process cannot be started
    /// - `RunnerError::ComputationFailed` if it exits unsuccessfully
    pub fn run(
        &self,
        template: &Path,
        params: &Parameters,
        cwd: &Path,
    ) -> Result<RunOutcome, RunnerError> {
        let loaded = Template::load(template)?;
        let invocation = loaded.invocation(params)?;
        self.execute(&loaded, invocation, cwd)
    }

    fn execute(
        &self,
        template: &Template,
        invocation: Invocation,
        cwd: &Path,
    ) -> Result<RunOutcome, RunnerError> {
        tracing::info!(
            template = %template.path().display(),
            cwd = %cwd.display(),
            "running template"
        );
        tracing::debug!(program = %invocation.program, arguments = ?invocation.arguments);

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.arguments)
            .current_dir(cwd)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .envs(&invocation.environment)
            .stdin(Stdio::null())
            .stdout(Stdio::from(std::io::stderr()));

        let started = Instant::now();
        let status = cmd.status().map_err(|source| RunnerError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;
        let duration = started.elapsed();

        if !status.success() {
            tracing::warn!(
                template = %template.path().display(),
                code = ?status.code(),
                "template failed"
            );
            return Err(RunnerError::ComputationFailed {
                template: template.path().to_path_buf(),
                status: ExitState(status.code()),
            });
        }

        tracing::debug!(elapsed_ms = duration.as_millis(), "template finished");
        Ok(RunOutcome {
            program: invocation.program,
            arguments: invocation.arguments,
            duration,
        })
    }
}
