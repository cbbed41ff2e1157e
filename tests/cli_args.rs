//! Integration tests for CLI argument handling
//!
//! Runs the binary against a temporary data directory and an API address
//! that refuses connections, so no test depends on a live server.

use std::process::Command;
use tempfile::TempDir;

/// Port 9 (discard) is closed on test machines; connections fail fast
const UNREACHABLE_API: &str = "http://127.0.0.1:9";

/// Helper to run the CLI with given args and capture output
fn run_cli(data_dir: &TempDir, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_tablesync"))
        .arg("--data-dir")
        .arg(data_dir.path())
        .args(["--api-url", UNREACHABLE_API])
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("TABLESYNC_API_URL")
        .env_remove("TABLESYNC_CACHE_VERSION")
        .output()
        .expect("Failed to execute tablesync")
}

#[test]
fn test_help_flag_exits_successfully() {
    let output = Command::new(env!("CARGO_BIN_EXE_tablesync"))
        .arg("--help")
        .output()
        .expect("Failed to execute tablesync");
    assert!(
        output.status.success(),
        "Expected --help to exit successfully"
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("tablesync"), "Help should mention tablesync");
    for subcommand in ["install", "refresh", "review", "pending", "sync", "watch"] {
        assert!(stdout.contains(subcommand), "Help should list {}", subcommand);
    }
}

#[test]
fn test_missing_subcommand_fails() {
    let output = Command::new(env!("CARGO_BIN_EXE_tablesync"))
        .output()
        .expect("Failed to execute tablesync");
    assert!(!output.status.success());
}

#[test]
fn test_invalid_rating_prints_error_and_exits() {
    let data_dir = TempDir::new().expect("Failed to create temp directory");
    let output = run_cli(
        &data_dir,
        &["review", "1", "--name", "Ann", "--rating", "11", "--comments", "Great"],
    );
    assert!(!output.status.success(), "Expected invalid rating to fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Invalid rating"),
        "Should print error message about the rating: {}",
        stderr
    );
}

#[test]
fn test_pending_on_empty_store() {
    let data_dir = TempDir::new().expect("Failed to create temp directory");
    let output = run_cli(&data_dir, &["pending"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No reviews waiting for sync"));
}

#[test]
fn test_offline_review_stays_pending() {
    let data_dir = TempDir::new().expect("Failed to create temp directory");

    let output = run_cli(
        &data_dir,
        &["review", "3", "--name", "Ann", "--rating", "5", "--comments", "Lovely"],
    );
    assert!(
        output.status.success(),
        "Queuing must succeed offline: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Review queued"));
    assert!(stdout.contains("1 still pending"), "stdout: {}", stdout);

    let output = run_cli(&data_dir, &["pending"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("restaurant 3"));
    assert!(stdout.contains("Lovely"));
    assert!(stdout.contains("[pending]"));
}

#[test]
fn test_sync_with_unreachable_api_keeps_entries() {
    let data_dir = TempDir::new().expect("Failed to create temp directory");
    run_cli(
        &data_dir,
        &["review", "2", "--name", "Bob", "--rating", "2", "--comments", "Cold"],
    );

    let output = run_cli(&data_dir, &["sync"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Synced 0 of 1"), "stdout: {}", stdout);
}

#[test]
fn test_refresh_with_unreachable_api_fails() {
    let data_dir = TempDir::new().expect("Failed to create temp directory");
    let output = run_cli(&data_dir, &["refresh"]);
    assert!(!output.status.success(), "Refresh needs the API");
    assert!(!data_dir.path().join("store").join("restaurantsData.json").exists());
}

#[test]
fn test_restaurants_offline_without_snapshot_fails() {
    let data_dir = TempDir::new().expect("Failed to create temp directory");
    let output = run_cli(&data_dir, &["restaurants"]);
    assert!(!output.status.success());
}
