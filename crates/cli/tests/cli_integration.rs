// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::path::PathBuf;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn repo_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .to_path_buf()
}

fn board_path() -> PathBuf {
    repo_root().join("configs/boards/msm7200.yaml")
}

fn temp_dir(prefix: &str) -> PathBuf {
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("gpiobank-tests-{}-{}", prefix, nonce));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_script(dir: &std::path::Path, contents: &str) -> PathBuf {
    let path = dir.join("script.yaml");
    std::fs::write(&path, contents).expect("Failed to write script");
    path
}

fn read_result(dir: &std::path::Path) -> serde_json::Value {
    let text = std::fs::read_to_string(dir.join("result.json")).expect("result.json missing");
    serde_json::from_str(&text).unwrap()
}

#[test]
fn test_falling_edge_wake_scenario_passes() {
    let out = temp_dir("wake");
    let script = repo_root().join("configs/scenarios/falling-edge-wake.yaml");

    let output = Command::new(env!("CARGO_BIN_EXE_gpiobank"))
        .args([
            "run",
            "--script",
            script.to_str().unwrap(),
            "--output-dir",
            out.to_str().unwrap(),
        ])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let result = read_result(&out);
    assert_eq!(result["result_schema_version"], "1.0");
    assert_eq!(result["status"], "pass");
    assert_eq!(result["dispatched"], serde_json::json!([93]));
    assert_eq!(result["metrics"]["wake_replays"], 1);
    assert!(result["assertions"]
        .as_array()
        .unwrap()
        .iter()
        .all(|a| a["passed"] == true));
    assert!(out.join("snapshot.json").exists());
}

#[test]
fn test_both_edge_scenario_with_mapped_mailbox() {
    let out = temp_dir("both-edge");
    let script = repo_root().join("configs/scenarios/both-edge.yaml");
    let smem = out.join("smem.bin");

    let status = Command::new(env!("CARGO_BIN_EXE_gpiobank"))
        .args([
            "run",
            "--script",
            script.to_str().unwrap(),
            "--smem-file",
            smem.to_str().unwrap(),
            "--output-dir",
            out.to_str().unwrap(),
        ])
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(0));
    assert_eq!(read_result(&out)["dispatched"], serde_json::json!([69, 69]));
    assert!(smem.exists());
}

#[test]
fn test_failed_assertion_exit_code() {
    let out = temp_dir("assert-fail");
    let script = write_script(
        &out,
        r#"
schema_version: "1.0"
steps:
  - op: request_irq
    pin: 20
    trigger: rising
  - op: handle_line
    line: 20
assertions:
  - dispatched: [84]
"#,
    );

    let status = Command::new(env!("CARGO_BIN_EXE_gpiobank"))
        .args([
            "run",
            "--board",
            board_path().to_str().unwrap(),
            "--script",
            script.to_str().unwrap(),
            "--output-dir",
            out.to_str().unwrap(),
        ])
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(1));

    let result = read_result(&out);
    assert_eq!(result["status"], "fail");
    assert_eq!(result["assertions"][0]["passed"], false);
    assert_eq!(result["metrics"]["spurious_lines"], 1);
}

#[test]
fn test_runtime_error_exit_code() {
    let out = temp_dir("runtime");
    let script = write_script(
        &out,
        r#"
schema_version: "1.0"
steps:
  - op: write
    pin: 3
    level: high
  - op: configure
    pin: 500
    flags: [drive_output]
  - op: write
    pin: 4
    level: high
"#,
    );

    let status = Command::new(env!("CARGO_BIN_EXE_gpiobank"))
        .args([
            "run",
            "--board",
            board_path().to_str().unwrap(),
            "--script",
            script.to_str().unwrap(),
            "--output-dir",
            out.to_str().unwrap(),
        ])
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(3));

    let result = read_result(&out);
    assert_eq!(result["status"], "error");
    assert_eq!(result["steps_executed"], 1);
    assert!(result["message"].as_str().unwrap().contains("500"));
}

#[test]
fn test_config_error_exit_code() {
    let out = temp_dir("config");
    let board = out.join("board.yaml");
    std::fs::write(
        &board,
        r#"
name: "broken"
banks:
  - name: "a"
    start: 0
    end: 40
    base_address: 0xA9200000
    line: 19
"#,
    )
    .unwrap();
    let script = write_script(
        &out,
        r#"
schema_version: "1.0"
board: "board.yaml"
steps:
  - op: handle_pending
"#,
    );

    let status = Command::new(env!("CARGO_BIN_EXE_gpiobank"))
        .args([
            "run",
            "--script",
            script.to_str().unwrap(),
            "--output-dir",
            out.to_str().unwrap(),
        ])
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(2));
    let result = read_result(&out);
    assert_eq!(result["status"], "error");
    assert!(result["message"].as_str().unwrap().contains("32"));

    let status = Command::new(env!("CARGO_BIN_EXE_gpiobank"))
        .args(["run", "--script", "/nonexistent/script.yaml"])
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(2));
}

#[test]
fn test_layout_json() {
    let output = Command::new(env!("CARGO_BIN_EXE_gpiobank"))
        .args(["layout", "--board", board_path().to_str().unwrap(), "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let layout: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let banks = layout["banks"].as_array().unwrap();
    assert_eq!(banks.len(), 6);
    assert_eq!(banks[1]["first_irq"], 80);
    assert_eq!(banks[1]["line"], 20);
    assert_eq!(layout["mailbox"]["words_per_array"], 4);
}
