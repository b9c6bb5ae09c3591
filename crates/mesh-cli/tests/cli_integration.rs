//! CLI integration tests
//!
//! Tests the mesh CLI using assert_cmd. None of these reach a network.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

const CLUSTERS: &str = "\
tpu:
  user: ops
  identity_file: ~/.ssh/id_ed25519
  hosts: [10.0.0.1, 10.0.0.2]
broken:
  user: ops
  identity_file: ~/.ssh/id_ed25519
  hosts: [not-an-ip]
";

fn mesh() -> Command {
    let mut cmd = Command::cargo_bin("mesh")
        .expect("Failed to locate mesh binary - ensure it's built before running tests");
    cmd.env_remove("MESH_CLUSTERS").env_remove("RUST_LOG");
    cmd
}

fn write_clusters(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("cluster.yaml");
    fs::write(&path, CLUSTERS).unwrap();
    path
}

#[test]
fn test_cli_help() {
    mesh()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("mesh"))
        .stdout(predicate::str::contains("Run jobs across a cluster"));
}

#[test]
fn test_cli_version() {
    mesh()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mesh"));
}

#[test]
fn test_cli_run_help() {
    mesh()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("workspace"));
}

#[test]
fn test_cli_watch_help() {
    mesh()
        .args(["watch", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--interval"))
        .stdout(predicate::str::contains("--once"));
}

#[test]
fn test_cli_run_requires_command() {
    mesh().args(["run", "tpu"]).assert().failure();
}

#[test]
fn test_cli_clusters_lists_valid_clusters() {
    let dir = tempfile::tempdir().unwrap();
    let clusters = write_clusters(dir.path());

    mesh()
        .arg("clusters")
        .arg("--clusters")
        .arg(&clusters)
        .assert()
        .success()
        .stdout(predicate::str::contains("tpu"))
        .stdout(predicate::str::contains("10.0.0.1, 10.0.0.2"))
        .stdout(predicate::str::contains("broken").not());
}

#[test]
fn test_cli_clusters_from_env() {
    let dir = tempfile::tempdir().unwrap();
    let clusters = write_clusters(dir.path());

    mesh()
        .arg("clusters")
        .env("MESH_CLUSTERS", &clusters)
        .assert()
        .success()
        .stdout(predicate::str::contains("tpu"));
}

#[test]
fn test_cli_missing_cluster_file() {
    let dir = tempfile::tempdir().unwrap();

    mesh()
        .arg("clusters")
        .arg("--clusters")
        .arg(dir.path().join("missing.yaml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("config file not found"));
}

#[test]
fn test_cli_unknown_cluster() {
    let dir = tempfile::tempdir().unwrap();
    let clusters = write_clusters(dir.path());

    mesh()
        .current_dir(dir.path())
        .args(["setup", "prod", "--clusters"])
        .arg(&clusters)
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "cluster 'prod' not found (available: tpu)",
        ));
}

#[test]
fn test_cli_setup_without_commands() {
    let dir = tempfile::tempdir().unwrap();
    let clusters = write_clusters(dir.path());
    fs::write(dir.path().join("mesh.yaml"), "prerun: [\"echo hi\"]\n").unwrap();

    mesh()
        .current_dir(dir.path())
        .args(["setup", "tpu", "--clusters"])
        .arg(&clusters)
        .assert()
        .success()
        .stdout(predicate::str::contains("No commands to run"));
}

#[test]
fn test_cli_run_without_job_spec() {
    let dir = tempfile::tempdir().unwrap();
    let clusters = write_clusters(dir.path());

    mesh()
        .current_dir(dir.path())
        .args(["run", "--clusters"])
        .arg(&clusters)
        .args(["tpu", "python", "train.py"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load job spec"));
}
