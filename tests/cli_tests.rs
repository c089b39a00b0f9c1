//! Demo binary smoke tests
#![allow(deprecated)] // suppress assert_cmd::Command::cargo_bin deprecation in tests

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use tempfile::{NamedTempFile, TempDir};

fn jouler() -> Command {
    let mut cmd = Command::cargo_bin("jouler").unwrap();
    cmd.env_remove("JOULER_CONFIG");
    cmd
}

#[test]
fn test_help() {
    jouler()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--power-rating"))
        .stdout(predicate::str::contains("--output"));
}

#[test]
fn test_version() {
    jouler()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("jouler"));
}

#[test]
fn test_small_run_prints_banner_and_powers() {
    jouler()
        .args(["--threads", "2", "--iterations", "2", "--depth", "4", "--output", "none"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Jouler v"))
        .stdout(predicate::str::contains("2 worker thread(s)"))
        .stdout(predicate::str::contains(" W"))
        .stdout(predicate::str::contains("2 thread(s) profiled"));
}

#[test]
fn test_console_output_goes_to_stderr() {
    jouler()
        .args(["--threads", "1", "--iterations", "1", "--depth", "2"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Method Power Attribution"))
        .stderr(predicate::str::contains("demo.Worker.run"));
}

#[test]
fn test_exclude_hides_methods() {
    jouler()
        .args([
            "--threads", "1", "--iterations", "1", "--depth", "2", "-x", "pause$",
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains("demo.Worker.compute"))
        .stderr(predicate::str::contains("demo.Worker.pause").not());
}

#[test]
fn test_file_output_writes_one_file_per_thread() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().join("power.txt");

    jouler()
        .args(["--threads", "2", "--iterations", "1", "--depth", "2", "--output", "file"])
        .arg("--dump-path")
        .arg(&base)
        .assert()
        .success();

    let files: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("power-") && name.ends_with(".txt"))
        .collect();
    assert_eq!(files.len(), 2);

    let text = std::fs::read_to_string(dir.path().join(&files[0])).unwrap();
    assert!(text.contains("Thread info"));
    assert!(text.contains("power: "));
}

#[test]
fn test_json_file_output() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().join("power.txt");

    jouler()
        .args([
            "--threads", "1", "--iterations", "1", "--depth", "2", "--output", "file", "--format",
            "json",
        ])
        .arg("--dump-path")
        .arg(&base)
        .assert()
        .success();

    let json = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .find(|e| e.path().extension().is_some_and(|x| x == "json"))
        .map(|e| std::fs::read_to_string(e.path()).unwrap())
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert!(value["methods"].is_array());
    assert!(value["power"].is_number());
}

#[test]
fn test_config_file_is_applied() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "power_rating_watts = 65.0").unwrap();
    writeln!(file, "output = \"none\"").unwrap();

    jouler()
        .args(["--threads", "1", "--iterations", "1", "--depth", "2", "--config"])
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("power rating 65W"));
}

#[test]
fn test_config_from_env_var() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "sampling_interval_ms = 7").unwrap();
    writeln!(file, "output = \"none\"").unwrap();

    Command::cargo_bin("jouler")
        .unwrap()
        .env("JOULER_CONFIG", file.path())
        .args(["--threads", "1", "--iterations", "1", "--depth", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sampling every 7ms"));
}

#[test]
fn test_invalid_config_fails() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "sampling_interval_ms = 0").unwrap();

    jouler()
        .arg("--config")
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("sampling_interval_ms"));
}

#[test]
fn test_zero_threads_rejected() {
    jouler()
        .args(["--threads", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--threads"));
}

#[test]
fn test_invalid_output_rejected() {
    jouler().args(["--output", "printer"]).assert().failure();
}
