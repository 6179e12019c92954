//! Integration tests for the `kasa-link` binary.
//!
//! Every test points the registry at a temporary file and the config
//! directories at a nonexistent path, so nothing touches the user's setup.
//! Network tests only talk to 127.0.0.1.
#![allow(clippy::unwrap_used)]

use std::net::TcpListener;
use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;

// ── Helpers ─────────────────────────────────────────────────────────

fn kasa_cmd(store: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("kasa-link");
    cmd.env("HOME", "/tmp/kasa-link-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/kasa-link-cli-test-nonexistent")
        .env("XDG_DATA_HOME", "/tmp/kasa-link-cli-test-nonexistent")
        .env_remove("KASA_LINK_TIMEOUT")
        .env_remove("KASA_LINK_SWEEP_TARGET")
        .env_remove("KASA_LINK_PORT")
        .env_remove("RUST_LOG")
        .env("KASA_LINK_STORE_PATH", store);
    cmd
}

/// A localhost port with nothing listening on it.
fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn json_stdout(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_version_command() {
    let dir = tempfile::tempdir().unwrap();
    kasa_cmd(&dir.path().join("registry.db"))
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_unknown_subcommand_is_invalid_args() {
    let dir = tempfile::tempdir().unwrap();
    kasa_cmd(&dir.path().join("registry.db"))
        .arg("explode")
        .assert()
        .code(4);
}

// ── Registry ────────────────────────────────────────────────────────

#[test]
fn test_register_show_list() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("registry.db");

    kasa_cmd(&store)
        .args(["register", "lamp", "10.0.0.5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("lamp"));
    kasa_cmd(&store)
        .args(["register", "fan", "10.0.0.6"])
        .assert()
        .success();

    let output = kasa_cmd(&store)
        .args(["show", "lamp", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let lamp = json_stdout(&output);
    assert_eq!(lamp["name"], "lamp");
    assert_eq!(lamp["address"], "10.0.0.5");
    assert_eq!(lamp["status"], "unknown");

    let output = kasa_cmd(&store)
        .args(["list", "--skip", "0", "--limit", "1", "--json"])
        .output()
        .unwrap();
    let page = json_stdout(&output);
    assert_eq!(page["count"], 1);
    assert_eq!(page["devices"][0]["name"], "lamp");

    // By id as well as by name.
    let id = lamp["id"].as_i64().unwrap().to_string();
    kasa_cmd(&store)
        .args(["show", id.as_str()])
        .assert()
        .success()
        .stdout(predicate::str::contains("10.0.0.5"));
}

#[test]
fn test_duplicate_name_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("registry.db");

    kasa_cmd(&store)
        .args(["register", "lamp", "10.0.0.5"])
        .assert()
        .success();
    kasa_cmd(&store)
        .args(["register", "lamp", "10.0.0.9"])
        .assert()
        .code(6)
        .stderr(predicate::str::contains("Error [DuplicateName]"));

    let output = kasa_cmd(&store)
        .args(["list", "--json"])
        .output()
        .unwrap();
    assert_eq!(json_stdout(&output)["count"], 1);
}

#[test]
fn test_show_missing_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    kasa_cmd(&dir.path().join("registry.db"))
        .args(["show", "ghost"])
        .assert()
        .code(5)
        .stderr(predicate::str::contains("Error [NotFound]").and(predicate::str::contains("ghost")));
}

#[test]
fn test_invalid_address_is_invalid_input() {
    let dir = tempfile::tempdir().unwrap();
    kasa_cmd(&dir.path().join("registry.db"))
        .args(["register", "lamp", "not-an-ip"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("Error [InvalidInput]"));
}

#[test]
fn test_remove_then_show() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("registry.db");

    kasa_cmd(&store)
        .args(["register", "lamp", "10.0.0.5"])
        .assert()
        .success();
    kasa_cmd(&store).args(["remove", "lamp"]).assert().success();
    kasa_cmd(&store).args(["show", "lamp"]).assert().code(5);
}

// ── Network ─────────────────────────────────────────────────────────

#[test]
fn test_power_on_unreachable_marks_offline() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("registry.db");
    let port = closed_port().to_string();

    kasa_cmd(&store)
        .args(["register", "lamp", "127.0.0.1"])
        .assert()
        .success();
    kasa_cmd(&store)
        .env("KASA_LINK_PORT", &port)
        .args(["power-on", "lamp", "--timeout", "500"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Error [Unreachable]").and(predicate::str::contains("'lamp'")));

    let output = kasa_cmd(&store)
        .args(["show", "lamp", "--json"])
        .output()
        .unwrap();
    let lamp = json_stdout(&output);
    assert_eq!(lamp["status"], "offline");
    assert_eq!(lamp["address"], "127.0.0.1");
}

#[test]
fn test_zero_timeout_rejected_before_io() {
    let dir = tempfile::tempdir().unwrap();
    kasa_cmd(&dir.path().join("registry.db"))
        .args(["sweep", "--timeout", "0"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("timeout"));
}

#[test]
fn test_bad_sweep_target_rejected() {
    let dir = tempfile::tempdir().unwrap();
    kasa_cmd(&dir.path().join("registry.db"))
        .args(["sweep", "--target", "10.0.0.0/8"])
        .assert()
        .code(4);
}
