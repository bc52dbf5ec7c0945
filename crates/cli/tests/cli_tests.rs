//! CLI integration tests

use std::process::Command;

fn fwctl() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_fwctl"));
    cmd.env_remove("FWCTL_API_URL");
    cmd
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = fwctl().arg("--help").output().expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("feedwatch"), "Should show app name");
    for command in ["feeds", "metrics", "baseline", "alerts", "failures"] {
        assert!(stdout.contains(command), "Should show {} command", command);
    }
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = fwctl().arg("--version").output().expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("fwctl"), "Should show binary name");
}

/// Test baseline subcommand help
#[test]
fn test_baseline_help() {
    let output = fwctl()
        .args(["baseline", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Baseline help should succeed");
    assert!(stdout.contains("--vendor"), "Should show vendor option");
    assert!(stdout.contains("--folder"), "Should show folder option");
    assert!(stdout.contains("--metric"), "Should show metric option");
}

/// Test format and api-url options
#[test]
fn test_global_options() {
    let output = fwctl().arg("--help").output().expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(stdout.contains("--format"), "Should show format option");
    assert!(stdout.contains("table"), "Should show table format");
    assert!(stdout.contains("json"), "Should show json format");
    assert!(stdout.contains("--api-url"), "Should show api-url option");
    assert!(stdout.contains("FWCTL_API_URL"), "Should show env var");
}

/// Test invalid command error handling
#[test]
fn test_invalid_command() {
    let output = fwctl()
        .arg("invalid-command")
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success(), "Invalid command should fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error"), "Should show error message");
}

/// Test that an unreachable daemon is reported as a failure
#[test]
fn test_unreachable_api_fails() {
    let output = fwctl()
        .args(["--api-url", "http://127.0.0.1:9", "feeds"])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success(), "Unreachable API should fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Failed to send request"),
        "Should report the connection failure"
    );
}
