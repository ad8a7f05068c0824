use std::{path::PathBuf, process::Command};

use serde_json::Value;

fn shipped_level(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../levels")
        .join(name)
}

#[test]
fn batch_prints_one_json_summary_per_policy() {
    let output = Command::new(env!("CARGO_BIN_EXE_sinkhole"))
        .arg("--json")
        .arg("batch")
        .arg(shipped_level("pillar_gate.toml"))
        .args(["--jobs", "2"])
        .env("RUST_LOG", "off")
        .output()
        .expect("failed to launch the sinkhole binary");

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8(output.stdout).expect("utf-8 output");
    let lines: Vec<Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).expect("summary is a json line"))
        .collect();

    assert_eq!(lines.len(), 3);
    let mut policies: Vec<&str> = lines
        .iter()
        .map(|line| line["policy"].as_str().expect("policy name"))
        .collect();
    policies.sort_unstable();
    assert_eq!(policies, ["greedy", "oracle", "tactical"]);
    for line in &lines {
        assert_eq!(line["level"], "pillar_gate");
        assert_eq!(line["outcome"], "win", "{line}");
        assert_eq!(line["moves_taken"], 3, "{line}");
    }
}

#[test]
fn run_reports_the_outcome_of_a_single_level() {
    let output = Command::new(env!("CARGO_BIN_EXE_sinkhole"))
        .arg("run")
        .arg(shipped_level("open_floor.toml"))
        .args(["--policy", "greedy", "--quiet"])
        .env("RUST_LOG", "off")
        .output()
        .expect("failed to launch the sinkhole binary");

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8(output.stdout).expect("utf-8 output");
    assert_eq!(stdout.lines().count(), 1, "{stdout}");
    assert!(stdout.starts_with("open_floor"), "{stdout}");
    assert!(stdout.contains("greedy"), "{stdout}");
}

#[test]
fn missing_level_files_fail_with_context() {
    let output = Command::new(env!("CARGO_BIN_EXE_sinkhole"))
        .arg("run")
        .arg(shipped_level("no_such_level.toml"))
        .env("RUST_LOG", "off")
        .output()
        .expect("failed to launch the sinkhole binary");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to read level file"), "{stderr}");
}
