use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_lists_every_mode() {
    Command::cargo_bin("sunlapse")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--run"))
        .stdout(predicate::str::contains("--status"))
        .stdout(predicate::str::contains("--validate"));
}

#[test]
fn a_mode_is_required() {
    Command::cargo_bin("sunlapse")
        .unwrap()
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn status_on_fresh_base_dir_reports_no_runs() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("sunlapse")
        .unwrap()
        .args(["--status", "--base-dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("no completed runs"));
}

#[test]
fn validate_rejects_a_bogus_frame() {
    let dir = tempfile::tempdir().unwrap();
    let frame = dir.path().join("frame_0000.jpg");
    std::fs::write(&frame, b"definitely not a jpeg, far too short").unwrap();

    Command::cargo_bin("sunlapse")
        .unwrap()
        .arg("--validate")
        .arg(&frame)
        .assert()
        .failure()
        .stdout(predicate::str::contains("1 failure"));
}
