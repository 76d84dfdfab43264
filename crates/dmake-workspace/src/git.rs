//! Backend over the `git` and `git annex` command lines

use crate::backend::Backend;
use crate::error::BackendError;
use dmake_codec::{DatasetPath, TEMPLATE_DIR};
use std::collections::{BTreeMap, BTreeSet};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

/// Dataset configuration file holding the dataset identifier
pub const DATASET_CONFIG: &str = ".datalad/config";

/// Configuration key of the dataset identifier
pub const DATASET_ID_KEY: &str = "datalad.dataset.id";

/// Backend driving a `git` executable with the git-annex extension
#[derive(Debug, Clone)]
pub struct GitAnnexBackend {
    git: PathBuf,
}

impl Default for GitAnnexBackend {
    fn default() -> Self {
        Self {
            git: PathBuf::from("git"),
        }
    }
}

impl GitAnnexBackend {
    /// Backend using `git` from `PATH`
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific `git` executable
    #[must_use]
    pub fn with_git(mut self, git: impl Into<PathBuf>) -> Self {
        self.git = git.into();
        self
    }

    fn describe<S: AsRef<OsStr>>(dir: &Path, args: &[S]) -> String {
        let mut parts = vec![format!("git -C {}", dir.display())];
        parts.extend(args.iter().map(|a| a.as_ref().to_string_lossy().into_owned()));
        parts.join(" ")
    }

    fn output<S: AsRef<OsStr>>(&self, dir: &Path, args: &[S]) -> Result<Output, BackendError> {
        tracing::debug!(command = %Self::describe(dir, args), "running");
        Command::new(&self.git)
            .arg("-C")
            .arg(dir)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| BackendError::Spawn {
                command: Self::describe(dir, args),
                source,
            })
    }

    /// Run a command, returning trimmed stdout on success
    fn git<S: AsRef<OsStr>>(&self, dir: &Path, args: &[S]) -> Result<String, BackendError> {
        let output = self.output(dir, args)?;
        if !output.status.success() {
            return Err(BackendError::command_failed(Self::describe(dir, args), &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Whether anything among `paths` is staged in `repo`
    fn has_staged_changes(&self, repo: &Path, paths: &[OsString]) -> Result<bool, BackendError> {
        let mut args: Vec<OsString> =
            vec!["diff".into(), "--cached".into(), "--quiet".into(), "--".into()];
        args.extend(paths.iter().cloned());
        let output = self.output(repo, &args)?;
        match output.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(BackendError::command_failed(Self::describe(repo, &args), &output)),
        }
    }

    fn commit_repo(
        &self,
        repo: &Path,
        files: &BTreeSet<PathBuf>,
        subdatasets: &BTreeSet<PathBuf>,
        message: &str,
    ) -> Result<(), BackendError> {
        let relative = |p: &PathBuf| -> OsString {
            p.strip_prefix(repo).unwrap_or(p).as_os_str().to_os_string()
        };
        let files: Vec<OsString> = files.iter().map(relative).collect();
        let subdatasets: Vec<OsString> = subdatasets.iter().map(relative).collect();

        if !files.is_empty() {
            let mut args: Vec<OsString> = vec!["annex".into(), "add".into(), "--".into()];
            args.extend(files.iter().cloned());
            self.git(repo, &args)?;
        }
        if !subdatasets.is_empty() {
            let mut args: Vec<OsString> = vec!["add".into(), "--".into()];
            args.extend(subdatasets.iter().cloned());
            self.git(repo, &args)?;
        }

        let all: Vec<OsString> = files.into_iter().chain(subdatasets).collect();
        if !self.has_staged_changes(repo, &all)? {
            tracing::debug!(repo = %repo.display(), "nothing to commit");
            return Ok(());
        }

        let mut args: Vec<OsString> = vec![
            "commit".into(),
            "--quiet".into(),
            "-m".into(),
            message.into(),
            "--".into(),
        ];
        args.extend(all);
        self.git(repo, &args)?;
        tracing::info!(repo = %repo.display(), "committed");
        Ok(())
    }
}

fn depth(path: &Path) -> usize {
    path.components().count()
}

impl Backend for GitAnnexBackend {
    fn resolve_revision(
        &self,
        dataset: &Path,
        revision: Option<&str>,
    ) -> Result<String, BackendError> {
        let revision = revision.unwrap_or("HEAD");
        let spec = format!("{revision}^{{commit}}");
        self.git(dataset, &["rev-parse", "--verify", "--quiet", spec.as_str()])
            .map_err(|err| match err {
                BackendError::CommandFailed { .. } => {
                    BackendError::UnknownRevision(revision.to_string())
                }
                other => other,
            })
    }

    fn toplevel(&self, path: &Path) -> Result<PathBuf, BackendError> {
        let dir = if path.is_dir() {
            path
        } else {
            path.parent().unwrap_or(path)
        };
        self.git(dir, &["rev-parse", "--show-toplevel"])
            .map(PathBuf::from)
            .map_err(|err| match err {
                BackendError::CommandFailed { .. } => {
                    BackendError::NotARepository(path.to_path_buf())
                }
                other => other,
            })
    }

    fn git_dir(&self, dataset: &Path) -> Result<PathBuf, BackendError> {
        self.git(dataset, &["rev-parse", "--absolute-git-dir"])
            .map(PathBuf::from)
    }

    fn dataset_id(&self, dataset: &Path) -> Result<String, BackendError> {
        let config = dataset.join(DATASET_CONFIG);
        let args = [
            OsStr::new("config"),
            OsStr::new("-f"),
            config.as_os_str(),
            OsStr::new("--get"),
            OsStr::new(DATASET_ID_KEY),
        ];
        let id = self
            .git(dataset, &args)
            .map_err(|err| match err {
                BackendError::CommandFailed { .. } => {
                    BackendError::MissingDatasetId(dataset.to_path_buf())
                }
                other => other,
            })?;
        if id.is_empty() {
            return Err(BackendError::MissingDatasetId(dataset.to_path_buf()));
        }
        Ok(id)
    }

    fn create_worktree(
        &self,
        dataset: &Path,
        worktree: &Path,
        revision: &str,
    ) -> Result<(), BackendError> {
        self.git(
            dataset,
            &[
                OsStr::new("worktree"),
                OsStr::new("add"),
                OsStr::new("--detach"),
                worktree.as_os_str(),
                OsStr::new(revision),
            ],
        )?;
        Ok(())
    }

    fn materialize(&self, worktree: &Path, paths: &[DatasetPath]) -> Result<(), BackendError> {
        let mut args: Vec<OsString> = vec!["annex".into(), "get".into(), "--".into()];
        args.push(TEMPLATE_DIR.into());
        args.extend(paths.iter().map(|p| OsString::from(p.as_string())));
        self.git(worktree, &args)?;
        Ok(())
    }

    fn unlock(&self, file: &Path) -> Result<(), BackendError> {
        let repo = self.toplevel(file)?;
        let relative = file.strip_prefix(&repo).unwrap_or(file);
        self.git(
            &repo,
            &[OsStr::new("annex"), OsStr::new("unlock"), OsStr::new("--"), relative.as_os_str()],
        )?;
        Ok(())
    }

    fn commit(&self, dataset: &Path, files: &[PathBuf], message: &str) -> Result<(), BackendError> {
        let root = self.toplevel(dataset)?;
        let mut pending: BTreeMap<PathBuf, (BTreeSet<PathBuf>, BTreeSet<PathBuf>)> = BTreeMap::new();
        for file in files {
            let repo = self.toplevel(file)?;
            pending.entry(repo).or_default().0.insert(file.clone());
        }

        // innermost first, each commit staging the submodule pointer in its parent
        while let Some(repo) = pending.keys().max_by_key(|p| depth(p)).cloned() {
            let Some((changed, subdatasets)) = pending.remove(&repo) else {
                break;
            };
            self.commit_repo(&repo, &changed, &subdatasets, message)?;
            if repo == root {
                continue;
            }
            let parent = repo
                .parent()
                .ok_or_else(|| BackendError::NotARepository(repo.clone()))?;
            let parent_repo = self.toplevel(parent)?;
            if parent_repo.starts_with(&root) {
                pending.entry(parent_repo).or_default().1.insert(repo);
            }
        }
        Ok(())
    }

    fn list_worktrees(&self, dataset: &Path) -> Result<Vec<PathBuf>, BackendError> {
        let listing = self.git(dataset, &["worktree", "list", "--porcelain"])?;
        Ok(listing
            .lines()
            .filter_map(|line| line.strip_prefix("worktree "))
            .map(PathBuf::from)
            .collect())
    }

    fn delete_worktree(&self, dataset: &Path, worktree: &Path) -> Result<(), BackendError> {
        self.git(
            dataset,
            &[
                OsStr::new("worktree"),
                OsStr::new("remove"),
                OsStr::new("--force"),
                worktree.as_os_str(),
            ],
        )?;
        Ok(())
    }

    fn register_url(&self, file: &Path, url: &str, relaxed: bool) -> Result<(), BackendError> {
        let repo = self.toplevel(file)?;
        let relative = file.strip_prefix(&repo).unwrap_or(file);
        let mut args = vec![
            OsStr::new("annex"),
            OsStr::new("addurl"),
            OsStr::new(url),
            OsStr::new("--file"),
            relative.as_os_str(),
        ];
        if relaxed {
            args.push(OsStr::new("--relaxed"));
        }
        self.git(&repo, &args)?;
        tracing::debug!(file = %file.display(), relaxed, "registered url");
        Ok(())
    }
}
