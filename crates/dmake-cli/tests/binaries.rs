//! The installed binaries, driven as git-annex and users would

use pretty_assertions::assert_eq;
use std::io::Write;
use std::process::{Command, Stdio};

#[test]
fn special_remote_answers_over_stdio() {
    let dataset = tempfile::tempdir().unwrap();
    let mut child = Command::new(env!("CARGO_BIN_EXE_git-annex-remote-compute"))
        .current_dir(dataset.path())
        .env_remove("DMAKE_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"PREPARE\nGETCOST\nCLAIMURL compute://id/method/eA\nGETINFO\n")
        .unwrap();
    let output = child.wait_with_output().unwrap();

    assert!(output.status.success());
    assert_eq!(
        String::from_utf8(output.stdout).unwrap().lines().collect::<Vec<_>>(),
        vec![
            "VERSION 1",
            "PREPARE-SUCCESS",
            "COST 100",
            "CLAIMURL-SUCCESS",
            "UNSUPPORTED-REQUEST",
        ]
    );
}

#[test]
fn special_remote_cost_follows_dataset_configuration() {
    let dataset = tempfile::tempdir().unwrap();
    let config_dir = dataset.path().join(".datalad/compute");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join("config.toml"), "[remote]\ncost = 250\n").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_git-annex-remote-compute"))
        .current_dir(dataset.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .and_then(|mut child| {
            child.stdin.take().unwrap().write_all(b"GETCOST\n")?;
            child.wait_with_output()
        })
        .unwrap();

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert_eq!(stdout.lines().nth(1), Some("COST 250"));
}

#[test]
fn dmake_rejects_escaping_output() {
    let output = Command::new(env!("CARGO_BIN_EXE_dmake"))
        .args(["compute", "--output", "/etc/passwd", "double.sh"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn dmake_compute_outside_a_dataset_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_dmake"))
        .current_dir(dir.path())
        .args(["compute", "--url-only", "-o", "out.txt", "double.sh"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("compute 'double.sh' failed"));
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.starts_with("compute(error): "));
}
