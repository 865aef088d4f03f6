use std::path::PathBuf;
use tempfile::TempDir;

use match_harvester::output::csv::write_export;
use match_harvester::output::jsonl::JsonlSink;
use match_harvester::output::{PartitionLayout, RecordSink};
use match_harvester::{DetailRecord, MatchId, PartitionKey};

fn record(n: u64) -> DetailRecord {
    DetailRecord::from_payload(
        MatchId::parse(&format!("KR_{n}")).unwrap(),
        serde_json::json!({
            "metadata": { "matchId": format!("KR_{n}") },
            "info": { "queueId": 420, "participants": [{}, {}] }
        }),
    )
}

#[test]
fn test_shared_and_dedicated_partitions_do_not_overlap() {
    let shared = PartitionLayout::new("data", PartitionKey::Shared);
    let dedicated = PartitionLayout::new("data", PartitionKey::Key(0));

    assert_eq!(shared.progress_path(), PathBuf::from("data/shared/progress.json"));
    assert_eq!(dedicated.progress_path(), PathBuf::from("data/key-0/progress.json"));
    assert_ne!(shared.records_path(), dedicated.records_path());
    assert_ne!(shared.lock_path(), dedicated.lock_path());
}

#[test]
fn test_partition_key_round_trips_through_directory_name() {
    for key in [PartitionKey::Shared, PartitionKey::Key(0), PartitionKey::Key(12)] {
        let name = key.to_filesystem_safe();
        assert_eq!(name.parse::<PartitionKey>().unwrap(), key);
    }
    assert!("key-x".parse::<PartitionKey>().is_err());
    assert!("keys".parse::<PartitionKey>().is_err());
}

#[test]
fn test_discover_ignores_missing_root() {
    let dir = TempDir::new().unwrap();
    assert!(PartitionLayout::discover(&dir.path().join("absent")).is_empty());
}

#[test]
fn test_sink_is_idempotent_across_reopen() {
    let dir = TempDir::new().unwrap();
    let layout = PartitionLayout::new(dir.path(), PartitionKey::Key(3));

    {
        let mut sink = JsonlSink::open(layout.records_path()).unwrap();
        assert!(sink.append(&record(1)).unwrap());
        assert!(sink.append(&record(2)).unwrap());
        assert!(!sink.append(&record(1)).unwrap());
        assert_eq!(sink.len(), 2);
    }

    let mut reopened = JsonlSink::open(layout.records_path()).unwrap();
    assert_eq!(reopened.len(), 2);
    assert!(reopened.contains(&MatchId::parse("KR_2").unwrap()));
    assert!(!reopened.append(&record(2)).unwrap());

    let content = std::fs::read_to_string(layout.records_path()).unwrap();
    assert_eq!(content.lines().count(), 2);
}

#[test]
fn test_torn_trailing_line_is_discarded() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("matches.jsonl");
    {
        let mut sink = JsonlSink::open(&path).unwrap();
        sink.append(&record(1)).unwrap();
    }
    let mut content = std::fs::read(&path).unwrap();
    content.extend_from_slice(b"{\"id\":\"KR_2\",\"payl");
    std::fs::write(&path, content).unwrap();

    let mut sink = JsonlSink::open(&path).unwrap();
    assert_eq!(sink.len(), 1);
    assert!(sink.append(&record(2)).unwrap());

    let reopened = JsonlSink::open(&path).unwrap();
    assert_eq!(reopened.len(), 2);
}

#[test]
fn test_export_writes_one_row_per_record() {
    let dir = TempDir::new().unwrap();
    let layout = PartitionLayout::new(dir.path(), PartitionKey::Shared);
    let mut sink = JsonlSink::open(layout.records_path()).unwrap();
    for n in [5, 3, 9] {
        sink.append(&record(n)).unwrap();
    }

    let rows = sink.export_snapshot().unwrap();
    let ids: Vec<&str> = rows.iter().map(|r| r.match_id.as_str()).collect();
    assert_eq!(ids, vec!["KR_5", "KR_3", "KR_9"]);

    let written = write_export(layout.export_path(), &rows).unwrap();
    assert_eq!(written, 3);

    let csv = std::fs::read_to_string(layout.export_path()).unwrap();
    let mut lines = csv.lines();
    assert!(lines.next().unwrap().starts_with("match_id"));
    assert_eq!(lines.count(), 3);
}
