// ABOUTME: Integration tests for the kubeling CLI commands.
// ABOUTME: Runs the binary against the in-memory engine so no daemon is needed.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

fn kubeling_cmd() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("kubeling"));
    cmd.env_remove("KUBELING_RUNTIME")
        .env_remove("KUBELING_SOCKET")
        .env_remove("KUBELING_TIMEOUT");
    cmd
}

#[test]
fn help_shows_commands() {
    kubeling_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("info"))
        .stdout(predicate::str::contains("nodes"))
        .stdout(predicate::str::contains("kubeconfig"));
}

#[test]
fn info_reports_memory_runtime() {
    let dir = tempfile::tempdir().unwrap();
    kubeling_cmd()
        .current_dir(dir.path())
        .args(["--runtime", "memory", "info"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Runtime:        memory"));
}

#[test]
fn info_json_is_machine_readable() {
    let dir = tempfile::tempdir().unwrap();
    let output = kubeling_cmd()
        .current_dir(dir.path())
        .args(["--runtime", "memory", "info", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let info: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(info["name"], "memory");
    assert_eq!(info["endpoint"], "memory://");
}

#[test]
fn runtime_is_read_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("kubeling.yml"), "runtime: memory\n").unwrap();

    kubeling_cmd()
        .current_dir(dir.path())
        .arg("nodes")
        .assert()
        .success()
        .stdout(predicate::str::contains("No nodes found."));
}

#[test]
fn unknown_runtime_fails() {
    let dir = tempfile::tempdir().unwrap();
    kubeling_cmd()
        .current_dir(dir.path())
        .args(["--runtime", "lxc", "info"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("unknown runtime `lxc`"));
}

#[test]
fn exec_in_missing_node_fails() {
    let dir = tempfile::tempdir().unwrap();
    kubeling_cmd()
        .current_dir(dir.path())
        .args(["--runtime", "memory", "exec", "server-0", "--", "true"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found: server-0"));
}

#[test]
fn bad_label_is_a_usage_error() {
    kubeling_cmd()
        .args(["--runtime", "memory", "nodes", "--label", "novalue"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected key=value"));
}

#[test]
fn tcp_socket_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    kubeling_cmd()
        .current_dir(dir.path())
        .args(["--runtime", "docker", "--socket", "tcp://127.0.0.1:2375", "info"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("only unix sockets"));
}
