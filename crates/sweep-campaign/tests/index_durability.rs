use std::fs::OpenOptions;
use std::io::Write;

use serde_json::Value;
use sweep_campaign::{
    ParameterCombination, ParameterValue, RunIndex, RunKey, RunRecord, RunStatus, StoreKind,
};

fn record(nodes: i64, repetition: u32, status: RunStatus, attempt: u32) -> RunRecord {
    let params: ParameterCombination = vec![("nodes".to_string(), ParameterValue::Int(nodes))]
        .into_iter()
        .collect();
    RunRecord {
        key: RunKey::new(&params, repetition).expect("key"),
        status,
        params,
        attempt,
        handle: (status == RunStatus::Completed).then(|| format!("data/{nodes}-{repetition}")),
        error: (status == RunStatus::Failed).then(|| "exit status 1".to_string()),
        metadata: Value::Null,
        elapsed_ms: 12,
        finished_at: "2024-05-01T10:00:00.000Z".to_string(),
    }
}

#[test]
fn recording_a_completed_key_twice_is_idempotent() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let index = RunIndex::open(dir.path(), StoreKind::Jsonl).expect("open");
    index
        .record(record(250, 0, RunStatus::Completed, 0))
        .expect("first");
    index
        .record(record(250, 0, RunStatus::Completed, 1))
        .expect("second");
    assert_eq!(index.snapshot().len(), 1);
    assert_eq!(index.completed_count(), 1);
    assert_eq!(index.attempts(), 2);
}

#[test]
fn records_survive_reopen() {
    for kind in [StoreKind::Jsonl, StoreKind::Sqlite] {
        let dir = tempfile::tempdir().expect("tmp dir");
        {
            let index = RunIndex::open(dir.path(), kind).expect("open");
            index
                .record(record(250, 0, RunStatus::Completed, 0))
                .expect("record");
            index
                .record(record(500, 1, RunStatus::Failed, 0))
                .expect("record");
        }
        let reopened = RunIndex::open(dir.path(), kind).expect("reopen");
        let done = record(250, 0, RunStatus::Completed, 0);
        let failed = record(500, 1, RunStatus::Failed, 0);
        assert!(reopened.contains(&done.key), "{kind:?}");
        assert!(!reopened.contains(&failed.key), "{kind:?}");
        assert_eq!(reopened.failed_keys(), vec![failed.key.clone()]);
        assert_eq!(reopened.history(&done.key), vec![done]);
    }
}

#[test]
fn torn_trailing_line_is_discarded() {
    let dir = tempfile::tempdir().expect("tmp dir");
    {
        let index = RunIndex::open(dir.path(), StoreKind::Jsonl).expect("open");
        index
            .record(record(250, 0, RunStatus::Completed, 0))
            .expect("record");
    }
    let path = dir.path().join("runs.jsonl");
    let mut file = OpenOptions::new().append(true).open(&path).expect("append");
    file.write_all(br#"{"key":{"fingerprint":"ab"#)
        .expect("torn write");
    drop(file);

    let index = RunIndex::open(dir.path(), StoreKind::Jsonl).expect("recover");
    assert_eq!(index.completed_count(), 1);
    index
        .record(record(500, 0, RunStatus::Completed, 0))
        .expect("append after recovery");
    drop(index);

    let index = RunIndex::open(dir.path(), StoreKind::Jsonl).expect("reopen");
    assert_eq!(index.completed_count(), 2);
}

#[test]
fn corrupt_line_is_a_storage_error() {
    let dir = tempfile::tempdir().expect("tmp dir");
    std::fs::write(dir.path().join("runs.jsonl"), "not json\n").expect("write");
    let err = RunIndex::open(dir.path(), StoreKind::Jsonl).expect_err("corrupt");
    assert_eq!(err.info().code, "store-corrupt");
    assert_eq!(err.info().context.get("line").map(String::as_str), Some("1"));
    assert!(err.is_fatal());
}

#[test]
fn corrupt_sqlite_file_is_a_storage_error() {
    let dir = tempfile::tempdir().expect("tmp dir");
    std::fs::write(dir.path().join("runs.sqlite"), vec![0x5a; 4096]).expect("write");
    let err = RunIndex::open(dir.path(), StoreKind::Sqlite).expect_err("corrupt");
    assert!(matches!(err, sweep_campaign::SweepError::Storage(_)));
}

#[test]
fn refresh_sees_records_from_another_handle() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let reader = RunIndex::open(dir.path(), StoreKind::Jsonl).expect("reader");
    let writer = RunIndex::open(dir.path(), StoreKind::Jsonl).expect("writer");
    writer
        .record(record(750, 2, RunStatus::Completed, 0))
        .expect("record");
    assert_eq!(reader.completed_count(), 0);
    reader.refresh().expect("refresh");
    assert_eq!(reader.completed_count(), 1);
}

#[test]
fn partial_record_from_a_failed_append_does_not_poison_later_records() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let index = RunIndex::open(dir.path(), StoreKind::Jsonl).expect("open");
    let first = record(1, 0, RunStatus::Completed, 0);
    index.record(first.clone()).expect("first");

    // Bytes a write cut short by a full disk would leave behind.
    let path = dir.path().join("runs.jsonl");
    let mut file = OpenOptions::new().append(true).open(&path).expect("append");
    file.write_all(br#"{"attempt":0,"elap"#).expect("partial write");
    drop(file);

    let second = record(2, 0, RunStatus::Completed, 0);
    index.record(second.clone()).expect("second");
    drop(index);

    let reopened = RunIndex::open(dir.path(), StoreKind::Jsonl).expect("reopen");
    assert!(reopened.contains(&first.key));
    assert!(reopened.contains(&second.key));
    assert_eq!(reopened.attempts(), 2);
    let text = std::fs::read_to_string(&path).expect("read");
    assert!(text.ends_with('\n'));
    assert_eq!(text.lines().count(), 2);
}
