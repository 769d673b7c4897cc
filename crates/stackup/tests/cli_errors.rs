use std::fs;

use predicates::str::contains;
use tempfile::TempDir;

#[test]
fn missing_explicit_config_reports_path() {
    let dir = TempDir::new().expect("create temp dir");
    let config = dir.path().join("absent.toml");

    assert_cmd::cargo::cargo_bin_cmd!("stackup")
        .arg("--config")
        .arg(&config)
        .arg("status")
        .assert()
        .failure()
        .stderr(contains("error: failed to read config file"))
        .stderr(contains("absent.toml"))
        .stderr(contains("caused by:"));
}

#[test]
fn invalid_plan_prints_cause_chain() {
    let dir = TempDir::new().expect("create temp dir");
    let plan = dir.path().join("plan.toml");
    fs::write(&plan, "name = \"empty\"\n").expect("write plan");

    assert_cmd::cargo::cargo_bin_cmd!("stackup")
        .arg("install")
        .arg("--journal")
        .arg(dir.path().join("journal.jsonl"))
        .arg(&plan)
        .env("STACKUP_NO_TTY", "1")
        .assert()
        .failure()
        .stderr(contains("error: plan error"))
        .stderr(contains("caused by:"));
}

#[test]
fn uninstall_removes_plan_artifacts() {
    let dir = TempDir::new().expect("create temp dir");
    let root = dir.path().display();
    let target = dir.path().join("opt/panel");
    fs::create_dir_all(&target).expect("create target");
    let plan = dir.path().join("plan.toml");
    fs::write(
        &plan,
        format!(
            r#"name = "panel"
[[steps]]
name = "Panel Directory"
action = {{ kind = "create_dir", path = "{root}/opt/panel" }}
undo = {{ action = {{ kind = "remove_dir", path = "{root}/opt/panel" }} }}
"#
        ),
    )
    .expect("write plan");

    assert_cmd::cargo::cargo_bin_cmd!("stackup")
        .arg("uninstall")
        .arg("--journal")
        .arg(dir.path().join("journal.jsonl"))
        .arg(&plan)
        .assert()
        .success()
        .stdout(contains("Rolling back (uninstall):"))
        .stdout(contains("✓ [normal] undo Panel Directory"));

    assert!(!target.exists());
}

#[test]
fn status_of_missing_journal_is_empty() {
    let dir = TempDir::new().expect("create temp dir");

    assert_cmd::cargo::cargo_bin_cmd!("stackup")
        .arg("status")
        .arg("--journal")
        .arg(dir.path().join("never-written.jsonl"))
        .assert()
        .success()
        .stdout(contains("Outstanding undo actions: 0"));
}
