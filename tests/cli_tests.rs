//! CLI tests for the turnstile binary
#![allow(deprecated)] // suppress assert_cmd::Command::cargo_bin deprecation in tests

use predicates::prelude::*;

fn quick_cmd() -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("turnstile");
    cmd.args([
        "--readers",
        "2",
        "--read-iterations",
        "2",
        "--writers",
        "2",
        "--write-iterations",
        "1",
        "--hold-ms",
        "1",
    ]);
    cmd
}

#[test]
fn test_cli_help() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("turnstile");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"))
        .stdout(predicate::str::contains("--deadline-ms"));
}

#[test]
fn test_small_roster_narrates_and_reports() {
    quick_cmd()
        .assert()
        .success()
        .stdout(predicate::str::contains("Bank employee 1 checks accounts:"))
        .stdout(predicate::str::contains(
            "Payment system 2 performs transaction: Withdrawal 300 UAH from account #1",
        ))
        .stdout(predicate::str::contains("Average read wait time:"))
        .stdout(predicate::str::contains("Total write wait time:"))
        .stdout(predicate::str::ends_with("All operations completed.\n"));
}

#[test]
fn test_quiet_suppresses_narration() {
    quick_cmd()
        .arg("--quiet")
        .assert()
        .success()
        .stdout(predicate::str::contains("checks accounts").not())
        .stdout(predicate::str::contains("Average write wait time:"));
}

#[test]
fn test_no_readers_reports_no_data() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("turnstile");
    cmd.args(["--readers", "0", "--writers", "1", "--write-iterations", "2"])
        .args(["--hold-ms", "0", "-q"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Average read wait time: no data"))
        .stdout(predicate::str::contains("NaN").not());
}

#[test]
fn test_empty_roster_is_rejected() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("turnstile");
    cmd.args(["--readers", "0", "--writers", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot both be 0"));
}

#[test]
fn test_json_report_is_parseable() {
    let output = quick_cmd().args(["--format", "json"]).output().unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["format"], "turnstile-json-v1");
    assert_eq!(value["read"]["attempts"], 4);
    assert_eq!(value["write"]["attempts"], 2);
    assert_eq!(value["entries"], 2);
    assert_eq!(value["completed"], true);
    assert_eq!(value["drivers"].as_array().unwrap().len(), 4);
}

#[test]
fn test_deadline_marks_missing_samples() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("turnstile");
    cmd.args(["--readers", "2", "--writers", "2", "--read-iterations", "1000"])
        .args(["--write-iterations", "1000", "--hold-ms", "2"])
        .args(["--deadline-ms", "50", "-q"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deadline reached"))
        .stdout(predicate::str::ends_with(
            "Operations finished with missing samples.\n",
        ));
}

#[test]
fn test_debug_traces_to_stderr_only() {
    quick_cmd()
        .args(["--debug", "-q"])
        .assert()
        .success()
        .stderr(predicate::str::contains("starting roster"))
        .stdout(predicate::str::contains("starting roster").not());
}
