//! Integration tests for the command line interface

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use match_harvester::resume::{ProgressSnapshot, ProgressStore};
use match_harvester::MatchId;

fn harvester_cmd() -> Command {
    let mut cmd = Command::cargo_bin("match-harvester").unwrap();
    cmd.env_remove("RIOT_API_KEYS")
        .env_remove("HARVEST_DATA_DIR")
        .env_remove("HARVEST_PLATFORM");
    cmd
}

fn seed_progress(dir: &TempDir, partition: &str) {
    let mut snapshot = ProgressSnapshot::new();
    snapshot.mark_processed("puuid-a", Some("MASTER".to_string()), chrono::Utc::now());
    snapshot.counters_mut().record_sent();
    snapshot.counters_mut().record_success();
    snapshot.collect(MatchId::parse("KR_7001").unwrap());
    ProgressStore::new(dir.path().join(partition).join("progress.json"))
        .save(&snapshot)
        .unwrap();
}

#[test]
fn test_platforms_lists_registry() {
    harvester_cmd()
        .args(["platforms"])
        .assert()
        .success()
        .stdout(predicate::str::contains("euw1"))
        .stdout(predicate::str::contains("asia"));
}

#[test]
fn test_platforms_json_filters_by_region() {
    let output = harvester_cmd()
        .args(["platforms", "--region", "asia", "--output-format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let platforms = value.as_array().unwrap();
    assert!(!platforms.is_empty());
    assert!(platforms.iter().all(|p| p["region"] == "asia"));
}

#[test]
fn test_validate_match_id() {
    harvester_cmd()
        .args(["validate", "match-id", "EUW1_7212345678"])
        .assert()
        .success()
        .stdout(predicate::str::contains("euw1"));

    harvester_cmd()
        .args(["validate", "match-id", "not-a-match"])
        .assert()
        .failure();
}

#[test]
fn test_validate_progress_file() {
    let dir = TempDir::new().unwrap();
    seed_progress(&dir, "shared");
    let path = dir.path().join("shared").join("progress.json");

    harvester_cmd()
        .args(["validate", "progress", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Collected ids: 1"));

    std::fs::write(&path, "{ \"schema_version\": ").unwrap();
    harvester_cmd()
        .args(["validate", "progress", path.to_str().unwrap()])
        .assert()
        .failure();
}

#[test]
fn test_status_reports_partition_counters() {
    let dir = TempDir::new().unwrap();
    seed_progress(&dir, "key-1");

    let output = harvester_cmd()
        .args([
            "status",
            "--api-key-index",
            "1",
            "--output-format",
            "json",
            "--data-dir",
            dir.path().to_str().unwrap(),
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value[0]["partition"], "key-1");
    assert_eq!(value[0]["collected"], 1);
    assert_eq!(value[0]["processed_units"], 1);
    assert_eq!(value[0]["counters"]["requests_succeeded"], 1);
}

#[test]
fn test_status_all_partitions() {
    let dir = TempDir::new().unwrap();
    seed_progress(&dir, "shared");
    seed_progress(&dir, "key-0");

    harvester_cmd()
        .args(["status", "--all-partitions", "--data-dir", dir.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("shared:"))
        .stdout(predicate::str::contains("key-0:"));
}

#[test]
fn test_reset_keeps_collected_ids() {
    let dir = TempDir::new().unwrap();
    seed_progress(&dir, "shared");

    harvester_cmd()
        .args(["reset", "--data-dir", dir.path().to_str().unwrap()])
        .assert()
        .success();

    let snapshot = ProgressStore::inspect(&dir.path().join("shared").join("progress.json")).unwrap();
    assert!(snapshot.processed().is_empty());
    assert_eq!(snapshot.collected().len(), 1);
}

#[test]
fn test_harvest_without_keys_fails() {
    let dir = TempDir::new().unwrap();
    harvester_cmd()
        .args(["harvest", "--no-progress", "--data-dir", dir.path().to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("API key"));
}

#[test]
fn test_export_without_records_fails() {
    let dir = TempDir::new().unwrap();
    harvester_cmd()
        .args(["export", "--data-dir", dir.path().to_str().unwrap()])
        .assert()
        .failure();
}
