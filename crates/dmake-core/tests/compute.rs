//! Compute orchestration scenarios against the directory-backed backend

#![cfg(unix)]

use dmake_codec::{DatasetPath, Parameters, ProvenanceUrl};
use dmake_core::{ComputeConfig, ComputeError, ComputeRequest, Orchestrator, Status, StatusRecord};
use dmake_test_utils::{
    dpath, workspace_root, DatasetFixture, DirectoryBackend, FAILING_METHOD, FIXTURE_ID,
    FIXTURE_REVISION,
};
use dmake_workspace::{Backend, BackendError};
use mockall::automock;
use pretty_assertions::assert_eq;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn orchestrator<'a>(backend: &'a DirectoryBackend, root: &TempDir) -> Orchestrator<&'a DirectoryBackend> {
    Orchestrator::new(backend)
        .with_config(ComputeConfig::new().with_workspace_root(root.path()))
}

fn double_request(dataset: &DatasetFixture) -> ComputeRequest {
    ComputeRequest::new(dataset.path(), "double.sh")
        .with_inputs(vec![dpath("in.txt")])
        .with_outputs(vec![dpath("out.txt")])
}

fn workspaces_left(root: &TempDir) -> usize {
    fs::read_dir(root.path()).unwrap().count()
}

#[test]
fn single_output_is_computed_committed_and_registered() {
    let dataset = DatasetFixture::doubling();
    let backend = DirectoryBackend::new();
    let root = workspace_root();

    let records = orchestrator(&backend, &root)
        .run(&double_request(&dataset))
        .unwrap();

    assert_eq!(dataset.read("out.txt"), "42");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, Status::Ok);
    assert_eq!(records[0].path, dataset.path().join("out.txt"));

    let url = records[0].url.clone().unwrap();
    let decoded: ProvenanceUrl = url.parse().unwrap();
    assert_eq!(decoded.descriptor.root_id, FIXTURE_ID);
    assert_eq!(decoded.descriptor.revision, FIXTURE_REVISION);
    assert_eq!(decoded.descriptor.method, "double.sh");
    assert_eq!(decoded.descriptor.inputs, vec![dpath("in.txt")]);
    assert_eq!(decoded.this, Some(dpath("out.txt")));

    assert_eq!(backend.commits(), vec![vec![dataset.path().join("out.txt")]]);
    let registrations = backend.registrations();
    assert_eq!(registrations.len(), 1);
    assert_eq!(registrations[0].url, url);
    assert!(!registrations[0].relaxed);
    assert_eq!(workspaces_left(&root), 0);
}

#[test]
fn url_only_registers_relaxed_without_computing() {
    let dataset = DatasetFixture::doubling();
    let backend = DirectoryBackend::new();
    let root = workspace_root();

    let records = orchestrator(&backend, &root)
        .run(&double_request(&dataset).url_only(true))
        .unwrap();

    assert_eq!(records.len(), 1);
    assert!(!dataset.exists("out.txt"));
    assert!(backend.commits().is_empty());
    assert!(backend.worktrees().is_empty());
    assert!(backend.registrations()[0].relaxed);
}

#[test]
fn explicit_branch_is_recorded() {
    let dataset = DatasetFixture::doubling();
    let backend = DirectoryBackend::new();
    let root = workspace_root();

    let records = orchestrator(&backend, &root)
        .run(&double_request(&dataset).with_branch("abc123").url_only(true))
        .unwrap();

    let decoded: ProvenanceUrl = records[0].url.as_deref().unwrap().parse().unwrap();
    assert_eq!(decoded.descriptor.revision, "abc123");
}

#[test]
fn one_url_per_output_sharing_the_descriptor() {
    let dataset = DatasetFixture::doubling();
    let backend = DirectoryBackend::new();
    let root = workspace_root();
    let request = ComputeRequest::new(dataset.path(), "double.sh")
        .with_parameters(Parameters::parse_assignments(["factor=2"]).unwrap())
        .with_outputs(vec![dpath("a.txt"), dpath("sub/b.txt")])
        .url_only(true);

    let records = orchestrator(&backend, &root).run(&request).unwrap();
    assert_eq!(records.len(), 2);

    let decoded: Vec<ProvenanceUrl> = records
        .iter()
        .map(|r| r.url.as_deref().unwrap().parse().unwrap())
        .collect();
    assert_eq!(decoded[0].descriptor, decoded[1].descriptor);
    assert_eq!(decoded[1].this, Some(dpath("sub/b.txt")));
    assert_eq!(decoded[0].descriptor.parameters.get("factor"), Some("2"));
}

#[test]
fn list_files_extend_inline_paths_without_dedup() {
    let dataset = DatasetFixture::doubling().with_file("inputs.txt", "in.txt\n\nextra.txt\n");
    let backend = DirectoryBackend::new();
    let root = workspace_root();
    let request = double_request(&dataset)
        .with_input_list(dataset.path().join("inputs.txt"))
        .url_only(true);

    let records = orchestrator(&backend, &root).run(&request).unwrap();

    let decoded: ProvenanceUrl = records[0].url.as_deref().unwrap().parse().unwrap();
    assert_eq!(
        decoded.descriptor.inputs,
        vec![dpath("in.txt"), dpath("in.txt"), dpath("extra.txt")]
    );
}

#[test]
fn invalid_list_entry_is_rejected() {
    let dataset = DatasetFixture::doubling().with_file("outputs.txt", "../escape.txt\n");
    let backend = DirectoryBackend::new();
    let root = workspace_root();
    let request = double_request(&dataset).with_output_list(dataset.path().join("outputs.txt"));

    let err = orchestrator(&backend, &root).run(&request).unwrap_err();
    assert!(matches!(err, ComputeError::InvalidInput(_)));
    assert!(backend.registrations().is_empty());
}

#[test]
fn list_entries_keep_surrounding_spaces() {
    let dataset = DatasetFixture::doubling().with_file("inputs.txt", " spaced.txt\r\n  \nlast.txt \n");
    let backend = DirectoryBackend::new();
    let root = workspace_root();
    let request = ComputeRequest::new(dataset.path(), "double.sh")
        .with_input_list(dataset.path().join("inputs.txt"))
        .with_outputs(vec![dpath("out.txt")])
        .url_only(true);

    let records = orchestrator(&backend, &root).run(&request).unwrap();

    let decoded: ProvenanceUrl = records[0].url.as_deref().unwrap().parse().unwrap();
    assert_eq!(
        decoded.descriptor.inputs,
        vec![dpath(" spaced.txt"), dpath("last.txt ")]
    );
}

#[test]
fn method_outside_the_methods_directory_is_rejected() {
    let dataset = DatasetFixture::doubling();
    let backend = DirectoryBackend::new();
    let root = workspace_root();
    let request = ComputeRequest::new(dataset.path(), "../escape.sh")
        .with_outputs(vec![dpath("out.txt")]);

    let err = orchestrator(&backend, &root).run(&request).unwrap_err();

    assert!(matches!(err, ComputeError::InvalidInput(_)));
    assert!(backend.worktrees().is_empty());
    assert!(backend.registrations().is_empty());
    assert_eq!(workspaces_left(&root), 0);
}

#[test]
fn failing_computation_copies_nothing() {
    let dataset = DatasetFixture::doubling().with_method("fail.sh", FAILING_METHOD);
    let backend = DirectoryBackend::new();
    let root = workspace_root();
    let request = ComputeRequest::new(dataset.path(), "fail.sh")
        .with_inputs(vec![dpath("in.txt")])
        .with_outputs(vec![dpath("out.txt")]);

    let err = orchestrator(&backend, &root).run(&request).unwrap_err();

    assert!(err.is_computation_failure());
    assert!(!dataset.exists("out.txt"));
    assert!(backend.commits().is_empty());
    assert!(backend.registrations().is_empty());
    assert_eq!(workspaces_left(&root), 0);
}

#[test]
fn missing_output_is_reported() {
    let dataset = DatasetFixture::doubling().with_method("noop.sh", "true\n");
    let backend = DirectoryBackend::new();
    let root = workspace_root();
    let request = ComputeRequest::new(dataset.path(), "noop.sh").with_outputs(vec![dpath("out.txt")]);

    let err = orchestrator(&backend, &root).run(&request).unwrap_err();
    assert!(matches!(err, ComputeError::MissingOutput(ref p) if *p == dpath("out.txt")));
    assert_eq!(workspaces_left(&root), 0);
}

#[test]
fn unknown_method_fails_before_collecting() {
    let dataset = DatasetFixture::doubling();
    let backend = DirectoryBackend::new();
    let root = workspace_root();
    let request = ComputeRequest::new(dataset.path(), "absent.sh").with_outputs(vec![dpath("out.txt")]);

    let err = orchestrator(&backend, &root).run(&request).unwrap_err();
    assert!(matches!(err, ComputeError::Runner(_)));
    assert!(!dataset.exists("out.txt"));
}

#[test]
fn provisioning_failure_leaves_dataset_untouched() {
    let dataset = DatasetFixture::doubling();
    let backend = DirectoryBackend::new().failing_materialize();
    let root = workspace_root();

    let err = orchestrator(&backend, &root)
        .run(&double_request(&dataset))
        .unwrap_err();

    assert!(err.is_provision_failure());
    assert!(!dataset.exists("out.txt"));
    assert_eq!(workspaces_left(&root), 0);
}

#[test]
fn registration_failure_keeps_committed_bytes() {
    let dataset = DatasetFixture::doubling();
    let backend = DirectoryBackend::new().failing_registration();
    let root = workspace_root();

    let err = orchestrator(&backend, &root)
        .run(&double_request(&dataset))
        .unwrap_err();

    assert!(err.is_registration_failure());
    assert_eq!(dataset.read("out.txt"), "42");
    assert_eq!(backend.commits().len(), 1);
}

#[automock]
trait Registrar {
    fn register(&self, file: &Path, url: &str, relaxed: bool) -> Result<(), BackendError>;
}

/// Directory backend whose registrations are scripted
struct ScriptedBackend {
    inner: DirectoryBackend,
    registrar: MockRegistrar,
}

impl Backend for ScriptedBackend {
    fn resolve_revision(
        &self,
        dataset: &Path,
        revision: Option<&str>,
    ) -> Result<String, BackendError> {
        self.inner.resolve_revision(dataset, revision)
    }

    fn toplevel(&self, path: &Path) -> Result<PathBuf, BackendError> {
        self.inner.toplevel(path)
    }

    fn git_dir(&self, dataset: &Path) -> Result<PathBuf, BackendError> {
        self.inner.git_dir(dataset)
    }

    fn dataset_id(&self, dataset: &Path) -> Result<String, BackendError> {
        self.inner.dataset_id(dataset)
    }

    fn create_worktree(
        &self,
        dataset: &Path,
        worktree: &Path,
        revision: &str,
    ) -> Result<(), BackendError> {
        self.inner.create_worktree(dataset, worktree, revision)
    }

    fn materialize(&self, worktree: &Path, paths: &[DatasetPath]) -> Result<(), BackendError> {
        self.inner.materialize(worktree, paths)
    }

    fn unlock(&self, file: &Path) -> Result<(), BackendError> {
        self.inner.unlock(file)
    }

    fn commit(&self, dataset: &Path, files: &[PathBuf], message: &str) -> Result<(), BackendError> {
        self.inner.commit(dataset, files, message)
    }

    fn list_worktrees(&self, dataset: &Path) -> Result<Vec<PathBuf>, BackendError> {
        self.inner.list_worktrees(dataset)
    }

    fn delete_worktree(&self, dataset: &Path, worktree: &Path) -> Result<(), BackendError> {
        self.inner.delete_worktree(dataset, worktree)
    }

    fn register_url(&self, file: &Path, url: &str, relaxed: bool) -> Result<(), BackendError> {
        self.registrar.register(file, url, relaxed)
    }
}

#[test]
fn records_emitted_before_a_registration_failure_stay_emitted() {
    let dataset = DatasetFixture::doubling();
    let mut registrar = MockRegistrar::new();
    registrar
        .expect_register()
        .times(2)
        .returning(|file, _url, relaxed| {
            assert!(relaxed);
            if file.ends_with("b.txt") {
                Err(BackendError::NotARepository(file.to_path_buf()))
            } else {
                Ok(())
            }
        });
    let backend = ScriptedBackend {
        inner: DirectoryBackend::new(),
        registrar,
    };
    let request = ComputeRequest::new(dataset.path(), "double.sh")
        .with_outputs(vec![dpath("a.txt"), dpath("b.txt"), dpath("c.txt")])
        .url_only(true);

    let mut emitted: Vec<StatusRecord> = Vec::new();
    let err = Orchestrator::new(backend)
        .run_with(&request, |record| emitted.push(record))
        .unwrap_err();

    assert!(matches!(err, ComputeError::Registration { ref path, .. } if *path == dpath("b.txt")));
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].path, dataset.path().join("a.txt"));
}
