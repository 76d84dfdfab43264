//! Testing utilities for the dmake workspace
//!
//! A directory-backed [`Backend`] and dataset fixtures, so provisioning and
//! orchestration can be tested without git or git-annex.

#![allow(missing_docs)]

use dmake_codec::{DatasetPath, TEMPLATE_DIR};
use dmake_workspace::{Backend, BackendError, DATASET_CONFIG};
use std::cell::RefCell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const FIXTURE_ID: &str = "a1b2c3d4-0000-4000-8000-fixture";
pub const FIXTURE_REVISION: &str = "1111111111111111111111111111111111111111";

/// Reads `in.txt` and writes twice its value to `out.txt`
pub const DOUBLE_METHOD: &str = r#"#!/bin/sh
v=$(cat in.txt)
printf '%s' "$((v * 2))" > out.txt
"#;

/// Always exits with status 1 after writing `out.txt`
pub const FAILING_METHOD: &str = "printf broken > out.txt\nexit 1\n";

/// Writes the `output` parameter's file with the value of `value`
pub const ECHO_RECIPE: &str = r#"executable = "sh"
arguments = ["-c", 'printf "%s" "$1" > "$2"', "sh", "{value}", "{output}"]
"#;

/// A registered content location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub file: PathBuf,
    pub url: String,
    pub relaxed: bool,
}

/// Backend treating plain directories as repositories
///
/// A repository is a directory holding a `.git` entry. Working trees are
/// recursive copies of the dataset. Every revision resolves to
/// [`FIXTURE_REVISION`] unless another one is named.
#[derive(Debug, Default)]
pub struct DirectoryBackend {
    registrations: RefCell<Vec<Registration>>,
    commits: RefCell<Vec<Vec<PathBuf>>>,
    worktrees: RefCell<Vec<PathBuf>>,
    unlocked: RefCell<Vec<PathBuf>>,
    fail_registration: bool,
    fail_materialize: bool,
}

impl DirectoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `register_url` call fail
    #[must_use]
    pub fn failing_registration(mut self) -> Self {
        self.fail_registration = true;
        self
    }

    /// Make every `materialize` call fail
    #[must_use]
    pub fn failing_materialize(mut self) -> Self {
        self.fail_materialize = true;
        self
    }

    pub fn registrations(&self) -> Vec<Registration> {
        self.registrations.borrow().clone()
    }

    pub fn commits(&self) -> Vec<Vec<PathBuf>> {
        self.commits.borrow().clone()
    }

    pub fn worktrees(&self) -> Vec<PathBuf> {
        self.worktrees.borrow().clone()
    }

    pub fn unlocked(&self) -> Vec<PathBuf> {
        self.unlocked.borrow().clone()
    }
}

fn failed(command: &str, stderr: &str) -> BackendError {
    BackendError::CommandFailed {
        command: command.to_string(),
        status: "exit status: 1".to_string(),
        stderr: stderr.to_string(),
    }
}

impl Backend for DirectoryBackend {
    fn resolve_revision(
        &self,
        dataset: &Path,
        revision: Option<&str>,
    ) -> Result<String, BackendError> {
        if !dataset.join(".git").exists() {
            return Err(BackendError::NotARepository(dataset.to_path_buf()));
        }
        match revision {
            None => Ok(FIXTURE_REVISION.to_string()),
            Some(rev) if rev.chars().all(|c| c.is_ascii_hexdigit()) && !rev.is_empty() => {
                Ok(rev.to_string())
            }
            Some(rev) => Err(BackendError::UnknownRevision(rev.to_string())),
        }
    }

    fn toplevel(&self, path: &Path) -> Result<PathBuf, BackendError> {
        path.ancestors()
            .find(|dir| dir.join(".git").exists())
            .map(Path::to_path_buf)
            .ok_or_else(|| BackendError::NotARepository(path.to_path_buf()))
    }

    fn git_dir(&self, dataset: &Path) -> Result<PathBuf, BackendError> {
        Ok(self.toplevel(dataset)?.join(".git"))
    }

    fn dataset_id(&self, dataset: &Path) -> Result<String, BackendError> {
        let config = fs::read_to_string(dataset.join(DATASET_CONFIG))
            .map_err(|_| BackendError::MissingDatasetId(dataset.to_path_buf()))?;
        config
            .lines()
            .find_map(|line| line.trim().strip_prefix("id = "))
            .map(str::to_string)
            .ok_or_else(|| BackendError::MissingDatasetId(dataset.to_path_buf()))
    }

    fn create_worktree(
        &self,
        dataset: &Path,
        worktree: &Path,
        _revision: &str,
    ) -> Result<(), BackendError> {
        copy_tree(dataset, worktree).map_err(|e| BackendError::io_error(worktree, e))?;
        fs::write(worktree.join(".git"), format!("gitdir: {}\n", dataset.join(".git").display()))
            .map_err(|e| BackendError::io_error(worktree, e))?;
        self.worktrees.borrow_mut().push(worktree.to_path_buf());
        Ok(())
    }

    fn materialize(&self, worktree: &Path, paths: &[DatasetPath]) -> Result<(), BackendError> {
        if self.fail_materialize {
            return Err(failed("annex get", "content not available"));
        }
        for path in paths {
            let file = path.to_path(worktree);
            if fs::symlink_metadata(&file).is_err() {
                return Err(failed("annex get", &format!("{path} not found")));
            }
        }
        Ok(())
    }

    fn unlock(&self, file: &Path) -> Result<(), BackendError> {
        let content = fs::read(file).map_err(|e| BackendError::io_error(file, e))?;
        fs::remove_file(file).map_err(|e| BackendError::io_error(file, e))?;
        fs::write(file, content).map_err(|e| BackendError::io_error(file, e))?;
        self.unlocked.borrow_mut().push(file.to_path_buf());
        Ok(())
    }

    fn commit(&self, _dataset: &Path, files: &[PathBuf], _message: &str) -> Result<(), BackendError> {
        self.commits.borrow_mut().push(files.to_vec());
        Ok(())
    }

    fn list_worktrees(&self, dataset: &Path) -> Result<Vec<PathBuf>, BackendError> {
        let mut all = vec![dataset.to_path_buf()];
        all.extend(self.worktrees.borrow().iter().cloned());
        Ok(all)
    }

    fn delete_worktree(&self, _dataset: &Path, worktree: &Path) -> Result<(), BackendError> {
        fs::remove_dir_all(worktree).map_err(|e| BackendError::io_error(worktree, e))?;
        self.worktrees.borrow_mut().retain(|w| w != worktree);
        Ok(())
    }

    fn register_url(&self, file: &Path, url: &str, relaxed: bool) -> Result<(), BackendError> {
        if self.fail_registration {
            return Err(failed("annex addurl", "registration refused"));
        }
        self.toplevel(file)?;
        self.registrations.borrow_mut().push(Registration {
            file: file.to_path_buf(),
            url: url.to_string(),
            relaxed,
        });
        Ok(())
    }
}

/// Copy a directory tree, keeping symlinks as symlinks and skipping `.git`
pub fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        if entry.file_name() == ".git" {
            continue;
        }
        let target = to.join(entry.file_name());
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else if file_type.is_symlink() {
            copy_link(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_link(from: &Path, to: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(from)?, to)
}

#[cfg(not(unix))]
fn copy_link(from: &Path, to: &Path) -> io::Result<()> {
    fs::copy(from, to).map(|_| ())
}

/// A dataset in a temporary directory
pub struct DatasetFixture {
    dir: TempDir,
}

impl DatasetFixture {
    /// Empty dataset with an identifier and a methods directory
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        fs::create_dir_all(dir.path().join(TEMPLATE_DIR)).unwrap();
        fs::write(
            dir.path().join(DATASET_CONFIG),
            format!("[datalad \"dataset\"]\n\tid = {FIXTURE_ID}\n"),
        )
        .unwrap();
        Self { dir }
    }

    /// The standard doubling scenario: `in.txt` holds 21
    pub fn doubling() -> Self {
        Self::new()
            .with_method("double.sh", DOUBLE_METHOD)
            .with_file("in.txt", "21")
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn git_dir(&self) -> PathBuf {
        self.path().join(".git")
    }

    #[must_use]
    pub fn with_file(self, relative: &str, content: &str) -> Self {
        let path = self.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
        self
    }

    #[must_use]
    pub fn with_method(self, name: &str, body: &str) -> Self {
        self.with_file(&format!("{TEMPLATE_DIR}/{name}"), body)
    }

    /// Nested repository at `relative`
    #[must_use]
    pub fn with_subdataset(self, relative: &str) -> Self {
        fs::create_dir_all(self.path().join(relative).join(".git")).unwrap();
        self
    }

    /// Symlink at `relative` pointing to a missing annex object
    #[cfg(unix)]
    #[must_use]
    pub fn with_dangling_link(self, relative: &str, key: &str) -> Self {
        let path = self.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        std::os::unix::fs::symlink(format!(".git/annex/objects/xx/yy/{key}/{key}"), path).unwrap();
        self
    }

    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.path().join(relative)).unwrap()
    }

    pub fn exists(&self, relative: &str) -> bool {
        fs::symlink_metadata(self.path().join(relative)).is_ok()
    }
}

impl Default for DatasetFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a dataset path, panicking on invalid input
pub fn dpath(path: &str) -> DatasetPath {
    path.parse().unwrap()
}

/// Workspace root in its own temporary directory
pub fn workspace_root() -> TempDir {
    tempfile::tempdir().unwrap()
}
