//! Basic CLI E2E tests.
//!
//! Tests invoke CLI commands via cargo run against a throwaway HOME so
//! each test gets its own config and database.

use std::path::Path;
use std::process::Command;

/// Run a CLI command with an isolated data directory.
fn run_cli(home: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new("cargo")
        .args(["run", "-p", "focusquest-cli", "--"])
        .args(args)
        .env("HOME", home)
        .env("FOCUSQUEST_ENV", "dev")
        .output()
        .expect("failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn run_ok(home: &Path, args: &[&str]) -> String {
    let (stdout, stderr, code) = run_cli(home, args);
    assert_eq!(code, 0, "command {args:?} failed: {stderr}");
    stdout
}

#[test]
fn help_lists_the_command_surface() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(home.path(), &["--help"]);
    assert_eq!(code, 0);
    for command in ["timer", "task", "stats", "profile", "garden", "challenge", "config"] {
        assert!(stdout.contains(command), "missing `{command}` in help output");
    }
}

#[test]
fn task_add_prints_the_new_task() {
    let home = tempfile::tempdir().unwrap();
    let stdout = run_ok(home.path(), &["task", "add", "Write the report", "--tags", "deep,work"]);
    let task: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(task["id"], 1);
    assert_eq!(task["status"], "TODO");
    assert_eq!(task["tags"][0], "deep");

    let stdout = run_ok(home.path(), &["task", "list"]);
    assert!(stdout.contains("Write the report"));
}

#[test]
fn config_values_round_trip() {
    let home = tempfile::tempdir().unwrap();
    run_ok(home.path(), &["config", "set", "schedule.focus_minutes", "30"]);
    let stdout = run_ok(home.path(), &["config", "get", "schedule.focus_minutes"]);
    assert_eq!(stdout.trim(), "30");

    let (_, stderr, code) = run_cli(home.path(), &["config", "get", "no.such.key"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("unknown key"));
}

#[test]
fn timer_lifecycle_start_status_stop() {
    let home = tempfile::tempdir().unwrap();
    run_ok(home.path(), &["task", "add", "Focus target"]);

    let stdout = run_ok(home.path(), &["timer", "status"]);
    assert!(stdout.contains("NoCycle"));

    let stdout = run_ok(home.path(), &["timer", "start", "--task", "1", "--estimate", "25"]);
    assert!(stdout.contains("TimerStarted"));

    let stdout = run_ok(home.path(), &["timer", "status"]);
    assert!(stdout.contains("StateSnapshot"));

    let stdout = run_ok(home.path(), &["timer", "stop"]);
    assert!(stdout.contains("PhaseCompleted"));
    assert!(stdout.contains("TimerStopped"));

    // The cycle is gone afterwards.
    let stdout = run_ok(home.path(), &["timer", "status"]);
    assert!(stdout.contains("NoCycle"));
}

#[test]
fn starting_twice_is_rejected() {
    let home = tempfile::tempdir().unwrap();
    run_ok(home.path(), &["task", "add", "Once"]);
    run_ok(home.path(), &["timer", "start", "--task", "1"]);
    let (_, stderr, code) = run_cli(home.path(), &["timer", "start", "--task", "1"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("already running"));
}

#[test]
fn challenge_seeding_is_idempotent() {
    let home = tempfile::tempdir().unwrap();
    let stdout = run_ok(home.path(), &["challenge", "seed"]);
    assert!(stdout.contains("installed"));
    let stdout = run_ok(home.path(), &["challenge", "seed"]);
    assert!(stdout.contains("already seeded"));

    let stdout = run_ok(home.path(), &["challenge", "list"]);
    assert!(stdout.contains("Daily Focus"));
    assert!(stdout.contains("First Steps"));
}

#[test]
fn profile_show_creates_the_profile() {
    let home = tempfile::tempdir().unwrap();
    let stdout = run_ok(home.path(), &["profile", "show"]);
    let profile: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(profile["level"], 1);
    assert_eq!(profile["experience"], 0);
    assert_eq!(profile["coins"], 0);
}
