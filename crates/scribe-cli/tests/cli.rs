// SPDX-License-Identifier: Apache-2.0
//! End-to-end CLI scenarios driving the `scribe` binary as a subprocess.

use assert_cmd::Command;
use predicates::prelude::*;

fn scribe() -> Command {
    Command::cargo_bin("scribe").unwrap()
}

#[test]
fn init_in_empty_dir_then_status_porcelain_reports_no_head() {
    let dir = tempfile::tempdir().unwrap();
    scribe().arg("init").arg(dir.path()).assert().success();

    scribe()
        .current_dir(dir.path())
        .args(["status", "--porcelain"])
        .assert()
        .success()
        .stdout(predicate::str::contains("head (none)"));
}

#[test]
fn init_then_one_commit_then_status_reports_64_hex_char_head() {
    let dir = tempfile::tempdir().unwrap();
    scribe().arg("init").arg(dir.path()).assert().success();

    scribe()
        .current_dir(dir.path())
        .args(["commit", "-m", "first", "-t", "users", "-o", "INSERT", "-d", r#"{"id":1}"#])
        .assert()
        .success();

    let output = scribe()
        .current_dir(dir.path())
        .args(["status", "--porcelain"])
        .output()
        .unwrap();
    let stdout = String::from_utf8(output.stdout).unwrap();
    let head_line = stdout.lines().find(|l| l.starts_with("head ")).unwrap();
    let id = head_line.trim_start_matches("head ").trim();
    assert_eq!(id.len(), 64);
    assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
}

#[test]
fn three_commits_then_oneline_log_lists_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    scribe().arg("init").arg(dir.path()).assert().success();

    for message in ["a", "b", "c"] {
        scribe()
            .current_dir(dir.path())
            .args(["commit", "-m", message])
            .assert()
            .success();
    }

    let output = scribe()
        .current_dir(dir.path())
        .args(["log", "--oneline", "-n", "10"])
        .output()
        .unwrap();
    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().filter(|l| !l.is_empty()).collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].ends_with(" c"));
    assert!(lines[1].ends_with(" b"));
    assert!(lines[2].ends_with(" a"));
}

#[tokio::test]
async fn corrupting_a_commit_message_fails_verify_but_reports_the_other_ok() {
    let dir = tempfile::tempdir().unwrap();
    scribe().arg("init").arg(dir.path()).assert().success();

    scribe().current_dir(dir.path()).args(["commit", "-m", "first"]).assert().success();
    scribe().current_dir(dir.path()).args(["commit", "-m", "second"]).assert().success();

    let db_path = dir.path().join(".scribe/scribe.db");
    let pool = sqlx::SqlitePool::connect(&format!("sqlite:{}", db_path.display())).await.unwrap();
    sqlx::query("UPDATE commits SET message = 'tampered' WHERE hash = (SELECT hash FROM commits ORDER BY timestamp ASC LIMIT 1)")
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;

    scribe()
        .current_dir(dir.path())
        .args(["verify", "--verbose"])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("FAILED"))
        .stdout(predicate::str::contains("OK"));
}
