//! On-demand retrieval and the special remote protocol

#![cfg(unix)]

use dmake_codec::{Parameters, Record};
use dmake_core::protocol::{serve, Channel};
use dmake_core::{
    AnnexHost, ComputeConfig, ComputeError, ComputeRemote, ComputeRequest, Orchestrator,
};
use dmake_test_utils::{
    dpath, workspace_root, DatasetFixture, DirectoryBackend, ECHO_RECIPE, FIXTURE_ID,
};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::fs;
use std::io::Cursor;
use std::path::PathBuf;
use tempfile::TempDir;

struct FakeHost {
    urls: Vec<String>,
    git_dir: PathBuf,
    debug: Vec<String>,
}

impl FakeHost {
    fn new(dataset: &DatasetFixture, urls: Vec<String>) -> Self {
        Self {
            urls,
            git_dir: dataset.git_dir(),
            debug: Vec::new(),
        }
    }
}

impl AnnexHost for FakeHost {
    fn get_urls(&mut self, _key: &str, prefix: &str) -> Result<Vec<String>, ComputeError> {
        Ok(self
            .urls
            .iter()
            .filter(|u| u.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn git_dir(&mut self) -> Result<PathBuf, ComputeError> {
        Ok(self.git_dir.clone())
    }

    fn debug(&mut self, message: &str) {
        self.debug.push(message.to_string());
    }
}

fn remote<'a>(
    backend: &'a DirectoryBackend,
    root: &TempDir,
) -> ComputeRemote<&'a DirectoryBackend> {
    ComputeRemote::new(backend)
        .with_config(ComputeConfig::new().with_workspace_root(root.path()))
}

/// Register `out.txt` of the doubling scenario without computing it
fn url_only_doubling(dataset: &DatasetFixture) -> String {
    let backend = DirectoryBackend::new();
    let request = ComputeRequest::new(dataset.path(), "double.sh")
        .with_inputs(vec![dpath("in.txt")])
        .with_outputs(vec![dpath("out.txt")])
        .url_only(true);
    let records = Orchestrator::new(&backend).run(&request).unwrap();
    records[0].url.clone().unwrap()
}

fn echo_record(parameters: &[&str]) -> Record {
    Record {
        root_id: FIXTURE_ID.to_string(),
        method: "echo.toml".to_string(),
        parameters: Parameters::parse_assignments(parameters.iter().copied()).unwrap(),
        dependencies: BTreeMap::new(),
    }
}

#[test]
fn url_only_then_retrieve_recomputes_content() {
    let dataset = DatasetFixture::doubling();
    let url = url_only_doubling(&dataset);
    assert!(!dataset.exists("out.txt"));

    let backend = DirectoryBackend::new();
    let root = workspace_root();
    let dest_dir = tempfile::tempdir().unwrap();
    let destination = dest_dir.path().join("KEY-tmp");
    let mut host = FakeHost::new(&dataset, vec![url]);

    remote(&backend, &root)
        .retrieve(&mut host, "KEY", &destination)
        .unwrap();

    assert_eq!(fs::read_to_string(&destination).unwrap(), "42");
    assert!(backend.worktrees().is_empty());
    assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
    assert_eq!(host.debug, vec!["recomputing KEY in a workspace".to_string()]);
}

#[test]
fn record_form_runs_template_with_destination_bound() {
    let dataset = DatasetFixture::new().with_method("echo.toml", ECHO_RECIPE);
    let backend = DirectoryBackend::new();
    let root = workspace_root();
    let dest_dir = tempfile::tempdir().unwrap();
    let destination = dest_dir.path().join("KEY-tmp");
    let urls = echo_record(&["value=hello world", "output=ignored"])
        .to_urls()
        .unwrap();
    let mut host = FakeHost::new(&dataset, urls);

    remote(&backend, &root)
        .retrieve(&mut host, "KEY", &destination)
        .unwrap();

    assert_eq!(fs::read_to_string(&destination).unwrap(), "hello world");
    assert!(backend.worktrees().is_empty());
}

#[test]
fn record_missing_dependencies_is_malformed() {
    let dataset = DatasetFixture::new().with_method("echo.toml", ECHO_RECIPE);
    let backend = DirectoryBackend::new();
    let root = workspace_root();
    let dest_dir = tempfile::tempdir().unwrap();
    let destination = dest_dir.path().join("KEY-tmp");
    let mut urls = echo_record(&["value=x"]).to_urls().unwrap();
    urls.retain(|u| !u.contains("/dependencies/"));
    let mut host = FakeHost::new(&dataset, urls);

    let err = remote(&backend, &root)
        .retrieve(&mut host, "KEY", &destination)
        .unwrap_err();

    assert!(err.is_malformed_record());
    assert!(!destination.exists());
}

#[test]
fn undecodable_record_segment_is_malformed() {
    let dataset = DatasetFixture::new().with_method("echo.toml", ECHO_RECIPE);
    let backend = DirectoryBackend::new();
    let root = workspace_root();
    let dest_dir = tempfile::tempdir().unwrap();
    let destination = dest_dir.path().join("KEY-tmp");
    let urls = echo_record(&["value=x"])
        .to_urls()
        .unwrap()
        .into_iter()
        .map(|url| match url.split_once("/parameter/") {
            Some((head, _)) => format!("{head}/parameter/!!!"),
            None => url,
        })
        .collect();
    let mut host = FakeHost::new(&dataset, urls);

    let err = remote(&backend, &root)
        .retrieve(&mut host, "KEY", &destination)
        .unwrap_err();

    assert!(err.is_malformed_record());
    assert!(!destination.exists());
    assert!(backend.worktrees().is_empty());
}

#[test]
fn descriptors_with_two_identities_are_malformed() {
    let dataset = DatasetFixture::doubling();
    let url = url_only_doubling(&dataset);
    let foreign = url.replace(FIXTURE_ID, "other-dataset");
    let backend = DirectoryBackend::new();
    let root = workspace_root();
    let mut host = FakeHost::new(&dataset, vec![url, foreign]);

    let err = remote(&backend, &root)
        .retrieve(&mut host, "KEY", &root.path().join("dest"))
        .unwrap_err();
    assert!(err.is_malformed_record());
    assert!(err.to_string().contains("single identity"));
}

#[test]
fn key_without_provenance_cannot_be_retrieved() {
    let dataset = DatasetFixture::new();
    let backend = DirectoryBackend::new();
    let root = workspace_root();
    let mut host = FakeHost::new(&dataset, vec!["https://example.org/data".to_string()]);
    let remote = remote(&backend, &root);

    assert!(!remote.checkpresent(&mut host, "KEY").unwrap());
    let err = remote
        .retrieve(&mut host, "KEY", &root.path().join("dest"))
        .unwrap_err();
    assert!(matches!(err, ComputeError::NoProvenance(ref key) if key == "KEY"));
}

#[test]
fn checkpresent_accepts_any_provenance_scheme() {
    let dataset = DatasetFixture::new();
    let backend = DirectoryBackend::new();
    let root = workspace_root();
    let remote = remote(&backend, &root);

    let mut record_host = FakeHost::new(&dataset, echo_record(&[]).to_urls().unwrap());
    assert!(remote.checkpresent(&mut record_host, "KEY").unwrap());

    let mut make_host = FakeHost::new(&dataset, vec!["datalad-make:///?root_id=x".to_string()]);
    assert!(remote.checkpresent(&mut make_host, "KEY").unwrap());
}

#[test]
fn protocol_session() {
    let dataset = DatasetFixture::doubling();
    let url = url_only_doubling(&dataset);
    let backend = DirectoryBackend::new();
    let root = workspace_root();
    let dest_dir = tempfile::tempdir().unwrap();
    let destination = dest_dir.path().join("KEY1 tmp");

    let git_dir = dataset.git_dir();
    let input = [
        "EXTENSIONS INFO ASYNC".to_string(),
        "INITREMOTE".to_string(),
        "PREPARE".to_string(),
        "GETCOST".to_string(),
        "CLAIMURL compute://ds/method/ZG91YmxlLnNo".to_string(),
        "CLAIMURL https://example.org/file".to_string(),
        "CHECKURL datalad-make:///?root_id=x".to_string(),
        "CHECKPRESENT KEY1".to_string(),
        format!("VALUE {url}"),
        "VALUE".to_string(),
        format!("TRANSFER RETRIEVE KEY1 {}", destination.display()),
        format!("VALUE {url}"),
        "VALUE ".to_string(),
        format!("VALUE {}", git_dir.display()),
        "TRANSFER STORE KEY1 somefile".to_string(),
        "REMOVE KEY1".to_string(),
        "GETINFO".to_string(),
    ]
    .join("\n")
        + "\n";

    let mut channel = Channel::new(Cursor::new(input.into_bytes()), Vec::new());
    serve(&remote(&backend, &root), &mut channel).unwrap();
    let output = String::from_utf8(channel.into_output()).unwrap();

    let expected = [
        "VERSION 1".to_string(),
        "EXTENSIONS".to_string(),
        "INITREMOTE-SUCCESS".to_string(),
        "PREPARE-SUCCESS".to_string(),
        "COST 100".to_string(),
        "CLAIMURL-SUCCESS".to_string(),
        "CLAIMURL-FAILURE".to_string(),
        "CHECKURL-CONTENTS UNKNOWN".to_string(),
        "GETURLS KEY1 ".to_string(),
        "CHECKPRESENT-SUCCESS KEY1".to_string(),
        "GETURLS KEY1 ".to_string(),
        "GETGITDIR".to_string(),
        "DEBUG recomputing KEY1 in a workspace".to_string(),
        "TRANSFER-SUCCESS RETRIEVE KEY1".to_string(),
        "TRANSFER-SUCCESS STORE KEY1".to_string(),
        "REMOVE-SUCCESS KEY1".to_string(),
        "UNSUPPORTED-REQUEST".to_string(),
    ];
    assert_eq!(output.lines().collect::<Vec<_>>(), expected.to_vec());
    assert_eq!(fs::read_to_string(&destination).unwrap(), "42");
}

#[test]
fn protocol_reports_failed_transfer() {
    let backend = DirectoryBackend::new();
    let root = workspace_root();
    let input = "TRANSFER RETRIEVE KEY2 /nonexistent/dest\nVALUE\n";

    let mut channel = Channel::new(Cursor::new(input.as_bytes().to_vec()), Vec::new());
    serve(&remote(&backend, &root), &mut channel).unwrap();
    let output = String::from_utf8(channel.into_output()).unwrap();

    let last = output.lines().last().unwrap();
    assert!(last.starts_with("TRANSFER-FAILURE RETRIEVE KEY2 no provenance"));
}
