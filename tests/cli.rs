//! Integration tests for the `uci` CLI, driving the built binary end-to-end
//! rather than the library API (see `src/context.rs` for the unit-level
//! equivalents of these same scenarios).
#![cfg(feature = "cli")]

use std::fs::{self, read_to_string};

use assert_cmd::cargo_bin_cmd;
use tempfile::TempDir;
use testresult::TestResult;

/// Sets up a confdir/savedir pair with a single `network` package (the §8
/// "S1" fixture), returning the temp dir that owns both.
fn fixture() -> TestResult<TempDir> {
    let dir = tempfile::tempdir()?;
    fs::create_dir_all(dir.path().join("config"))?;
    fs::write(
        dir.path().join("config").join("network"),
        "config interface 'lan'\n\toption ipaddr '192.168.1.1'\n",
    )?;
    Ok(dir)
}

fn uci(dir: &TempDir) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("uci");
    cmd.arg("-c").arg(dir.path().join("config"));
    cmd.arg("-P").arg(dir.path().join("save"));
    cmd
}

/// §8 S1: `get` after `load` returns the on-disk value; `set` + `commit`
/// persists the new value and the save file records exactly one delta.
#[test]
fn set_and_commit_updates_canonical_file_and_save_log() -> TestResult {
    let dir = fixture()?;

    let output = uci(&dir).args(["get", "network.lan.ipaddr"]).assert().success();
    assert_eq!(
        String::from_utf8_lossy(&output.get_output().stdout),
        "192.168.1.1\n"
    );

    uci(&dir)
        .args(["set", "network.lan.ipaddr=10.0.0.1"])
        .assert()
        .success();
    uci(&dir).args(["commit", "network"]).assert().success();

    let save_file = read_to_string(dir.path().join("save").join("network"))?;
    assert_eq!(save_file.trim(), "network.lan.ipaddr=10.0.0.1");

    let output = uci(&dir).args(["get", "network.lan.ipaddr"]).assert().success();
    assert_eq!(
        String::from_utf8_lossy(&output.get_output().stdout),
        "10.0.0.1\n"
    );

    Ok(())
}

/// `get` on a pointer that does not resolve exits non-zero and says so on
/// stderr (§7 "user-visible failure messages").
#[test]
fn get_on_missing_pointer_fails() -> TestResult {
    let dir = fixture()?;
    let output = uci(&dir)
        .args(["get", "network.lan.nonexistent"])
        .assert()
        .failure();
    let stderr = String::from_utf8_lossy(&output.get_output().stderr);
    assert!(stderr.contains("not found"), "stderr was: {stderr}");
    Ok(())
}

/// An unrecognized subcommand exits `255` (§6), not `1` or clap's own
/// default usage-error code.
#[test]
fn unknown_subcommand_exits_255() -> TestResult {
    let dir = fixture()?;
    uci(&dir)
        .arg("frobnicate")
        .assert()
        .failure()
        .code(255);
    Ok(())
}

/// `export -o json` renders the same tree `export` does, as JSON (§6
/// EXPANDED).
#[test]
fn export_json_round_trips_scalar_and_list_values() -> TestResult {
    let dir = fixture()?;
    uci(&dir)
        .args(["set", "network.lan.proto=static"])
        .assert()
        .success();
    uci(&dir)
        .args(["add-list", "network.lan.dns=1.1.1.1"])
        .assert()
        .success();

    let output = uci(&dir)
        .args(["export", "network", "-o", "json"])
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout);
    assert!(stdout.contains("\"name\": \"lan\""));
    assert!(stdout.contains("\"ipaddr\""));
    assert!(stdout.contains("\"dns\""));
    assert!(stdout.contains("1.1.1.1"));

    Ok(())
}

/// `uci add` creates a new anonymous section and prints its generated name
/// (§8 S2's naming scheme, exercised end-to-end).
#[test]
fn add_creates_anonymous_section_with_generated_name() -> TestResult {
    let dir = fixture()?;
    let output = uci(&dir)
        .args(["add", "network", "route"])
        .assert()
        .success();
    let name = String::from_utf8_lossy(&output.get_output().stdout)
        .trim()
        .to_string();
    assert!(name.starts_with("cfg"));

    let output = uci(&dir)
        .args(["get", &format!("network.{name}")])
        .assert()
        .success();
    assert_eq!(String::from_utf8_lossy(&output.get_output().stdout), "route\n");

    Ok(())
}

/// `uci revert` restores a pointer's on-disk value after an uncommitted
/// `set` (§8 "Revert" property).
#[test]
fn revert_restores_value_after_uncommitted_set() -> TestResult {
    let dir = fixture()?;
    uci(&dir)
        .args(["set", "network.lan.ipaddr=10.0.0.1"])
        .assert()
        .success();
    uci(&dir)
        .args(["revert", "network.lan.ipaddr"])
        .assert()
        .success();

    let output = uci(&dir).args(["get", "network.lan.ipaddr"]).assert().success();
    assert_eq!(
        String::from_utf8_lossy(&output.get_output().stdout),
        "192.168.1.1\n"
    );

    Ok(())
}
