mod common;

use common::*;
use std::process::Command;

fn cli_command() -> Command {
    Command::new(env!("CARGO_BIN_EXE_flowpilot"))
}

#[test]
fn test_cli_help() {
    let output = cli_command().arg("--help").output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Run declarative workflows"));
    assert!(stdout.contains("run"));
    assert!(stdout.contains("validate"));
    assert!(stdout.contains("list"));
}

#[test]
fn test_cli_version() {
    let output = cli_command().arg("--version").output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("flowpilot"));
}

#[test]
fn test_cli_run_help() {
    let output = cli_command().args(["run", "--help"]).output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Run a single workflow file"));
    assert!(stdout.contains("--data"));
    assert!(stdout.contains("--data-file"));
    assert!(stdout.contains("--config"));
}

#[test]
fn test_cli_run_success() {
    let dir = create_test_dir();
    write_workflow(dir.path(), "simple.yaml", &simple_workflow("simple"));

    let output = cli_command()
        .args(["run", dir.path().join("simple.yaml").to_str().unwrap()])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(r#""status": "completed""#));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("✓"));
}

#[test]
fn test_cli_run_with_data_takes_branch() {
    let dir = create_test_dir();
    write_workflow(dir.path(), "approval.yaml", &approval_workflow("approval"));

    let output = cli_command()
        .args([
            "run",
            dir.path().join("approval.yaml").to_str().unwrap(),
            "--data",
            r#"{"amount": 250}"#,
        ])
        .output()
        .unwrap();

    assert!(output.status.success());
    let execution: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(execution["data"]["action"], "approve");
}

#[test]
fn test_cli_run_with_data_file() {
    let dir = create_test_dir();
    write_workflow(dir.path(), "approval.yaml", &approval_workflow("approval"));
    std::fs::write(dir.path().join("input.json"), r#"{"amount": 5}"#).unwrap();

    let output = cli_command()
        .args([
            "run",
            dir.path().join("approval.yaml").to_str().unwrap(),
            "--data-file",
            dir.path().join("input.json").to_str().unwrap(),
        ])
        .output()
        .unwrap();

    assert!(output.status.success());
    let execution: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(execution["data"]["action"], "reject");
}

#[test]
fn test_cli_run_failing_step_exits_nonzero() {
    let dir = create_test_dir();
    write_workflow(dir.path(), "failing.yaml", &failing_workflow("failing"));

    let output = cli_command()
        .args(["run", dir.path().join("failing.yaml").to_str().unwrap()])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("✗"));
}

#[test]
fn test_cli_run_nonexistent_file() {
    let output = cli_command()
        .args(["run", "/nonexistent/workflow.yaml"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to load workflow"));
}

#[test]
fn test_cli_run_invalid_data() {
    let dir = create_test_dir();
    write_workflow(dir.path(), "simple.yaml", &simple_workflow("simple"));

    let output = cli_command()
        .args([
            "run",
            dir.path().join("simple.yaml").to_str().unwrap(),
            "--data",
            "{not json",
        ])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not valid JSON"));
}

#[test]
fn test_cli_run_uses_sibling_engine_config() {
    let dir = create_test_dir();
    write_workflow(
        dir.path(),
        "spin.yaml",
        r#"
name: spin
steps:
  - id: start
    type: trigger
  - id: spin
    type: loop
    loop:
      condition: "true"
"#,
    );
    write_engine_config(dir.path(), "default_max_iterations: 3");

    let output = cli_command()
        .args(["run", dir.path().join("spin.yaml").to_str().unwrap()])
        .output()
        .unwrap();

    assert!(output.status.success());
    let execution: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let spin = execution["steps"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["stepId"] == "spin")
        .unwrap();
    assert_eq!(spin["iterations"], 3);
}

#[test]
fn test_cli_validate_file() {
    let dir = create_test_dir();
    write_workflow(dir.path(), "simple.yaml", &simple_workflow("simple"));

    let output = cli_command()
        .args(["validate", dir.path().join("simple.yaml").to_str().unwrap()])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("is valid"));
}

#[test]
fn test_cli_validate_directory() {
    let dir = create_test_dir();
    write_workflow(dir.path(), "a.yaml", &simple_workflow("a"));
    write_workflow(dir.path(), "b.yaml", &approval_workflow("b"));

    let output = cli_command()
        .args(["validate", dir.path().to_str().unwrap()])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("2 workflows validated"));
}

#[test]
fn test_cli_validate_invalid_file() {
    let dir = create_test_dir();
    write_workflow(dir.path(), "bad.yaml", "name: [broken");

    let output = cli_command()
        .args(["validate", dir.path().join("bad.yaml").to_str().unwrap()])
        .output()
        .unwrap();

    assert!(!output.status.success());
}

#[test]
fn test_cli_list() {
    let dir = create_test_dir();
    write_workflow(dir.path(), "a.yaml", &simple_workflow("alpha"));
    write_workflow(dir.path(), "b.yaml", &approval_workflow("beta"));

    let output = cli_command()
        .args(["list", dir.path().to_str().unwrap()])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("alpha"));
    assert!(stdout.contains("beta"));
    assert!(stdout.contains("triggers: start"));
}

#[test]
fn test_cli_list_empty_directory() {
    let dir = create_test_dir();

    let output = cli_command()
        .args(["list", dir.path().to_str().unwrap()])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No workflows found"));
}
