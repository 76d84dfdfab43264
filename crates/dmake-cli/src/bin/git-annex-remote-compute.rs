//! git-annex external special remote regenerating computed files
//!
//! Started by git-annex in the repository; speaks the special remote
//! protocol on stdin/stdout.

use anyhow::{Context, Result};
use dmake_core::protocol::{serve, Channel};
use dmake_core::{ComputeConfig, ComputeRemote};
use dmake_workspace::GitAnnexBackend;
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("git-annex-remote-compute: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let cwd = std::env::current_dir().context("cannot determine working directory")?;
    let config = ComputeConfig::load(&cwd)?;
    dmake_cli::logging::init(&config.log);
    tracing::debug!(version = dmake_cli::VERSION, dataset = %cwd.display(), "special remote starting");

    let remote = ComputeRemote::new(GitAnnexBackend::new()).with_config(config);
    let stdin = std::io::stdin();
    let mut channel = Channel::new(stdin.lock(), std::io::stdout().lock());
    serve(&remote, &mut channel).context("special remote channel failed")
}
