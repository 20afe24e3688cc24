use assert_cmd::Command;
use mockito::{Matcher, Server};
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

const LISTING: &str = include_str!("fixtures/listing.xml");

fn digest() -> Command {
    let mut cmd = Command::cargo_bin("arxiv-digest").unwrap();
    cmd.env_remove("DIGEST_CATEGORIES").env_remove("DIGEST_DATA_DIR");
    cmd
}

#[test]
fn test_cli_rejects_invalid_category() {
    digest()
        .args(["fetch", "-c", "not a category", "-d", "2024-01-10"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a category"));
}

#[test]
fn test_cli_rejects_bad_dates() {
    digest()
        .args(["fetch", "-c", "eess.AS", "-d", "2024-01-10:2024-01-01"])
        .assert()
        .failure();
    digest()
        .args(["fetch", "-c", "eess.AS", "-d", "10/01/2024"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("YYYY-MM-DD"));
}

#[test]
fn test_cli_window_prints_business_days() {
    let output = digest().args(["window", "--days", "7"]).output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let dates: Vec<chrono::NaiveDate> = stdout
        .lines()
        .map(|line| chrono::NaiveDate::parse_from_str(line, "%Y-%m-%d").unwrap())
        .collect();
    assert_eq!(dates.len(), 7);
    assert!(dates.iter().all(|d| !arxiv_digest::window::is_weekend(*d)));
}

#[test]
fn test_cli_summarize_without_key_creates_credential_file() {
    let dir = tempdir().unwrap();
    let key_file = dir.path().join("api_key.txt");

    digest()
        .arg("--data-dir")
        .arg(dir.path().join("tables"))
        .arg("--credential-file")
        .arg(&key_file)
        .args(["summarize", "-c", "eess.AS", "-d", "2024-01-10"])
        .assert()
        .success();

    assert!(key_file.is_file());
}

#[test]
fn test_cli_fetch_writes_table() {
    let mut server = Server::new();
    let _mock = server
        .mock("GET", "/api/query")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(LISTING)
        .create();
    let dir = tempdir().unwrap();

    digest()
        .env("ARXIV_BASE_URL", server.url())
        .arg("--data-dir")
        .arg(dir.path())
        .args(["fetch", "-c", "eess.AS", "-d", "2024-01-10"])
        .assert()
        .success()
        .stdout(predicate::str::contains("arxiv_eessAS_2024-01-10.csv"));

    let table = fs::read_to_string(dir.path().join("arxiv_eessAS_2024-01-10.csv")).unwrap();
    assert!(table.contains("2401.05432"));
    assert!(table.contains("2401.05101"));
    assert!(!table.contains("2401.04000"));
}

#[test]
fn test_cli_fetch_fails_when_listing_unavailable() {
    let mut server = Server::new();
    let _mock = server
        .mock("GET", "/api/query")
        .match_query(Matcher::Any)
        .with_status(503)
        .create();
    let dir = tempdir().unwrap();

    digest()
        .env("ARXIV_BASE_URL", server.url())
        .arg("--data-dir")
        .arg(dir.path())
        .args(["fetch", "-c", "eess.AS", "-d", "2024-01-10"])
        .assert()
        .failure();

    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_cli_rejects_future_dates_before_doing_work() {
    let dir = tempdir().unwrap();
    for command in ["run", "fetch", "summarize"] {
        digest()
            .arg("--data-dir")
            .arg(dir.path().join("tables"))
            .arg("--credential-file")
            .arg(dir.path().join("api_key.txt"))
            .args([command, "-c", "eess.AS", "-d", "2999-01-01"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("in the future"));
    }
    assert!(!dir.path().join("api_key.txt").exists());
    assert!(!dir.path().join("tables").exists());
}
