// crates/geofeed-cli/tests/config_command.rs
// ============================================================================
// Module: CLI Config Command Tests
// Description: Integration tests for `geofeed config` and failing `serve`.
// Purpose: Ensure invalid configuration fails fast with a non-zero exit.
// Dependencies: geofeed binary
// ============================================================================
//! ## Overview
//! Runs the built `geofeed` binary against example and broken config files.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::PathBuf;
use std::process::Command;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn geofeed_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_geofeed"))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn example_config_round_trips_through_validate() {
    let example = Command::new(geofeed_bin()).args(["config", "example"]).output().unwrap();
    assert!(example.status.success());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("geofeed.toml");
    fs::write(&path, &example.stdout).unwrap();

    let validate = Command::new(geofeed_bin())
        .args(["config", "validate", "--config"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(validate.status.success(), "{}", String::from_utf8_lossy(&validate.stderr));
    assert_eq!(String::from_utf8_lossy(&validate.stdout).trim(), "config ok");
}

#[test]
fn validate_rejects_inverted_keep_alive() {
    let example = Command::new(geofeed_bin()).args(["config", "example"]).output().unwrap();
    let broken = String::from_utf8(example.stdout)
        .unwrap()
        .replace("pong_wait_ms = 10000", "pong_wait_ms = 1000");

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("geofeed.toml");
    fs::write(&path, broken).unwrap();

    let validate = Command::new(geofeed_bin())
        .args(["config", "validate", "--config"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(!validate.status.success());
    let stderr = String::from_utf8_lossy(&validate.stderr);
    assert!(stderr.contains("pong_wait_ms"), "{stderr}");
}

#[test]
fn serve_fails_fast_on_missing_config() {
    let dir = tempfile::tempdir().unwrap();
    let output = Command::new(geofeed_bin())
        .args(["serve", "--config"])
        .arg(dir.path().join("absent.toml"))
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to load config"), "{stderr}");
}

#[test]
fn version_flag_prints_package_version() {
    let output = Command::new(geofeed_bin()).arg("--version").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("geofeed {}", env!("CARGO_PKG_VERSION")));
}
