//! Integration tests for durable, resumable progress

use chrono::Utc;
use tempfile::TempDir;

use match_harvester::resume::{
    Cursor, PartitionLock, ProgressSnapshot, ProgressStore, SnapshotEnvelope, SnapshotOrigin,
};
use match_harvester::MatchId;

fn populated() -> ProgressSnapshot {
    let mut snapshot = ProgressSnapshot::new();
    let now = Utc::now();
    snapshot.mark_processed("puuid-a", Some("CHALLENGER".to_string()), now);
    snapshot.mark_processed("puuid-b", Some("DIAMOND".to_string()), now);
    for n in 1..=3 {
        snapshot.counters_mut().record_sent();
        snapshot.counters_mut().record_success();
        snapshot.collect(MatchId::parse(&format!("KR_{n}")).unwrap());
    }
    snapshot.set_cursor(Cursor::new(0, 2));
    snapshot
}

#[test]
fn test_snapshot_survives_save_and_load() {
    let dir = TempDir::new().unwrap();
    let store = ProgressStore::new(dir.path().join("progress.json"));
    let snapshot = populated();

    store.save(&snapshot).unwrap();
    let loaded = store.load().unwrap();

    assert_eq!(loaded.origin, SnapshotOrigin::Restored);
    assert_eq!(loaded.snapshot, snapshot);
}

#[test]
fn test_save_leaves_no_temporary_files() {
    let dir = TempDir::new().unwrap();
    let store = ProgressStore::new(dir.path().join("progress.json"));
    store.save(&populated()).unwrap();
    store.save(&populated()).unwrap();

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n != "progress.lock")
        .collect();
    assert_eq!(names, vec!["progress.json".to_string()]);
}

#[test]
fn test_truncated_progress_file_is_quarantined() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("progress.json");
    let store = ProgressStore::new(&path);
    store.save(&populated()).unwrap();

    // Simulate a partial write
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

    let loaded = store.load().unwrap();
    assert!(loaded.snapshot.processed().is_empty());
    assert!(loaded.snapshot.collected().is_empty());
    assert!(loaded.snapshot.cursor().is_start());
    match loaded.origin {
        SnapshotOrigin::Quarantined { moved_to, .. } => {
            assert!(moved_to.exists());
            assert!(!path.exists());
        }
        other => panic!("expected quarantine, got {other:?}"),
    }
}

#[test]
fn test_cursor_beyond_processed_set_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("progress.json");

    // A correctly checksummed snapshot whose cursor points past its units
    let mut value = serde_json::to_value(populated()).unwrap();
    value["cursor"]["unit_index"] = serde_json::json!(99);
    let broken: ProgressSnapshot = serde_json::from_value(value).unwrap();
    let envelope = SnapshotEnvelope::seal(broken).unwrap();
    std::fs::write(&path, serde_json::to_vec(&envelope).unwrap()).unwrap();

    assert!(ProgressStore::inspect(&path).is_err());

    let loaded = ProgressStore::new(&path).load().unwrap();
    assert!(matches!(loaded.origin, SnapshotOrigin::Quarantined { .. }));
    assert!(loaded.snapshot.processed().is_empty());
}

#[test]
fn test_tampered_checksum_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("progress.json");
    ProgressStore::new(&path).save(&populated()).unwrap();

    let mut value: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    value["checksum"] = serde_json::json!("0000");
    std::fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();

    let err = ProgressStore::inspect(&path).unwrap_err();
    assert!(err.is_corruption());
}

#[test]
fn test_reset_keeps_collected_ids_and_counters() {
    let dir = TempDir::new().unwrap();
    let store = ProgressStore::new(dir.path().join("progress.json"));
    store.save(&populated()).unwrap();

    let snapshot = store.reset_progress().unwrap();
    assert!(snapshot.processed().is_empty());
    assert!(snapshot.cursor().is_start());
    assert_eq!(snapshot.collected().len(), 3);
    assert_eq!(snapshot.counters().requests_succeeded, 3);
}

#[test]
fn test_clear_tiers_forgets_only_matching_units() {
    let dir = TempDir::new().unwrap();
    let store = ProgressStore::new(dir.path().join("progress.json"));
    store.save(&populated()).unwrap();

    let cleared = store.clear_tiers(&["diamond".to_string()]).unwrap();
    assert_eq!(cleared, 1);

    let snapshot = store.load().unwrap().snapshot;
    assert!(snapshot.is_processed("puuid-a"));
    assert!(!snapshot.is_processed("puuid-b"));
}

#[test]
fn test_partition_lock_is_exclusive() {
    let dir = TempDir::new().unwrap();
    let mut first = PartitionLock::open(dir.path()).unwrap();
    let mut second = PartitionLock::open(dir.path()).unwrap();

    let held = first.try_hold().unwrap();
    assert!(second.try_hold().is_err());

    drop(held);
    assert!(second.try_hold().is_ok());
}
