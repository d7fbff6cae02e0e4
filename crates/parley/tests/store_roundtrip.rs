use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use parley::loader::encode_record;
use parley::markup::parse_markup;
use parley::models::GenericValue;
use parley::store::{ConversationStore, RunStatus, RunTotals};

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time should be after unix epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("{prefix}-{nanos}"))
}

#[test]
fn stored_values_decode_to_the_canonical_parsed_tree() {
    let temp = unique_temp_dir("parley-store-roundtrip");
    let store_path = temp.join("nested").join("conversations.sqlite");
    let source = temp.join("a.yaml");
    let value = parse_markup(
        r#"
id: c1
created: 2001-12-14t21:59:43.10-05:00
day: 2026-02-05
score: 0.25
count: 7
tags: [alpha, beta]
messages:
  - role: user
    content:
      - type: text
        text: "héllo, wörld"
"#,
        "a.yaml",
    )
    .expect("fixture should parse");

    let mut store = ConversationStore::open(&store_path).expect("store should open");
    let record = encode_record("c1", &value, &source).expect("fixture should encode");
    store
        .put_batch("run-1", &[record])
        .expect("batch should commit");
    store.close().expect("store should close");

    let reopened = ConversationStore::open_read_only(&store_path).expect("store should reopen");
    let decoded = reopened
        .get_value("c1")
        .expect("read should succeed")
        .expect("c1 should be stored");
    assert_eq!(
        decoded,
        value.canonicalized().expect("timestamps should render")
    );
    assert_eq!(
        decoded.get("created").and_then(GenericValue::as_str),
        Some("2001-12-14T21:59:43.1-05:00")
    );
    assert_eq!(decoded.get("day").and_then(GenericValue::as_str), Some("2026-02-05"));
    assert_eq!(
        reopened.source_path("c1").expect("read should succeed"),
        Some(source.to_string_lossy().to_string())
    );
}

#[test]
fn keys_are_listed_in_byte_order_with_a_limit() {
    let mut store = ConversationStore::open_in_memory().expect("store should open");
    let value = parse_markup("id: x\n", "x.yaml").expect("fixture should parse");
    let records = ["zeta", "alpha", "mid", "Beta"]
        .into_iter()
        .map(|key| {
            encode_record(key, &value, &PathBuf::from(format!("/data/{key}.yaml")))
                .expect("fixture should encode")
        })
        .collect::<Vec<_>>();
    store.put_batch("run-1", &records).expect("batch should commit");

    assert_eq!(store.count().expect("count should succeed"), 4);
    assert_eq!(
        store.keys(3).expect("keys should list"),
        vec!["Beta", "alpha", "mid"]
    );
}

#[test]
fn failing_write_rolls_back_the_whole_batch() {
    let temp = unique_temp_dir("parley-store-rollback");
    let store_path = temp.join("conversations.sqlite");
    let mut store = ConversationStore::open(&store_path).expect("store should open");

    let guard = rusqlite::Connection::open(&store_path).expect("second connection should open");
    guard
        .execute_batch(
            "CREATE TRIGGER reject_poison BEFORE INSERT ON conversation_records
             WHEN NEW.record_key = CAST('poison' AS BLOB)
             BEGIN SELECT RAISE(ABORT, 'poisoned record'); END;",
        )
        .expect("trigger should install");
    drop(guard);

    let value = parse_markup("id: x\n", "x.yaml").expect("fixture should parse");
    let records = ["ok-1", "poison", "ok-2"]
        .into_iter()
        .map(|key| {
            encode_record(key, &value, &PathBuf::from(format!("/data/{key}.yaml")))
                .expect("fixture should encode")
        })
        .collect::<Vec<_>>();

    let error = store
        .put_batch("run-1", &records)
        .expect_err("poisoned batch must fail");
    assert!(
        format!("{error:#}").contains("key=poison"),
        "unexpected error: {error:#}"
    );
    assert_eq!(store.count().expect("count should succeed"), 0);
}

#[test]
fn ingest_runs_move_from_running_to_final_status() {
    let store = ConversationStore::open_in_memory().expect("store should open");
    store
        .begin_run("run-1", "2026-02-05T07:00:03Z", "/data")
        .expect("run row should insert");
    assert_eq!(
        store.run_status("run-1").expect("status should read").as_deref(),
        Some("running")
    );

    store
        .finish_run(
            "run-1",
            RunStatus::PartialFailure,
            "2026-02-05T07:00:04Z",
            &RunTotals {
                files_seen: 3,
                records_stored: 2,
                files_failed: 1,
                failure_counts_json: r#"{"parse_error":1}"#.to_string(),
            },
        )
        .expect("run row should finalize");
    assert_eq!(
        store.run_status("run-1").expect("status should read").as_deref(),
        Some("partial_failure")
    );
}

#[test]
fn read_only_open_requires_an_existing_store() {
    let missing = unique_temp_dir("parley-store-missing").join("conversations.sqlite");
    let error = ConversationStore::open_read_only(&missing).expect_err("missing store must fail");

    assert!(error.to_string().contains("store does not exist"));
}
