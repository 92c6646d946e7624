use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn cli(home: &TempDir) -> Command {
    let mut c = Command::cargo_bin("auto-updater").unwrap();
    c.env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join("config"))
        .env("XDG_DATA_HOME", home.path().join("data"))
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .args(["--host", "host-a", "--state-dir"])
        .arg(home.path().join("state"));
    c
}

#[test]
fn offset_is_negative_and_stable() {
    let home = TempDir::new().unwrap();
    let first = cli(&home).arg("offset").assert().success().get_output().stdout.clone();
    let value: i64 = String::from_utf8(first.clone()).unwrap().trim().parse().unwrap();
    assert!((-96..0).contains(&value));
    cli(&home).arg("offset").assert().success().stdout(first);
}

#[test]
fn zero_delay_is_rejected() {
    let home = TempDir::new().unwrap();
    cli(&home)
        .args(["--node-check-delay-hours", "0", "check"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid configuration"));
}

#[test]
fn never_updated_host_is_due() {
    let home = TempDir::new().unwrap();
    cli(&home)
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("host-a is due for an update (NeverUpdated)"));
}

#[test]
fn marked_host_counts_down() {
    let home = TempDir::new().unwrap();
    cli(&home).arg("mark").assert().success();
    cli(&home)
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("host-a will auto-update in"));
    cli(&home)
        .args(["check", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"reason\": \"not_yet\""));
    cli(&home).arg("reset").assert().success().stdout(predicate::str::contains("had record: true"));
    cli(&home).arg("check").assert().success().stdout(predicate::str::contains("is due"));
}

#[test]
fn dry_run_lists_steps_and_records_nothing() {
    let home = TempDir::new().unwrap();
    cli(&home)
        .args(["run", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("apt-get -y update"))
        .stdout(predicate::str::contains("apt autoremove -y (failure ignored)"));
    cli(&home)
        .args(["check", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"reason\": \"never_updated\""));
}

#[test]
fn run_before_due_does_nothing() {
    let home = TempDir::new().unwrap();
    cli(&home).arg("mark").assert().success();
    cli(&home)
        .arg("run")
        .assert()
        .success()
        .stdout(predicate::str::contains("will auto-update in"));
}
