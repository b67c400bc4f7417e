//! End-to-end scenarios across the codec, storage and core crates.

use proptest::prelude::*;
use relsync_codec::{RowKey, Value};
use relsync_core::{
    decode_changes, encode_changes, ChangeOperation, Config, QuerySource, ReadOptions,
    RowStatus, WireOptions, Workspace,
};
use relsync_storage::{hash_reader, verify, BlobProvider, MemoryCursor};
use relsync_testkit::prelude::*;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;

#[test]
fn insert_command_leaves_out_generated_key() {
    let fx = TestWorkspace::new();
    let commands = fx.commands("department").unwrap();

    let insert = commands.insert(None).unwrap();
    assert_eq!(insert.parameter_columns().collect::<Vec<_>>(), vec!["name", "code"]);
    assert!(insert.parameter("id").is_none());

    let generated = commands.insert_generated(None).unwrap();
    assert_eq!(generated.parameter_columns().collect::<Vec<_>>(), vec!["name", "code"]);
    assert_eq!(generated.columns, vec!["id"]);
}

#[test]
fn update_command_puts_key_last() {
    let fx = TestWorkspace::new();
    let update = fx.commands("department").unwrap().update(None).unwrap();
    assert_eq!(
        update.parameter_columns().collect::<Vec<_>>(),
        vec!["name", "code", "id"]
    );
    assert_eq!(
        update.text,
        r#"UPDATE "department" SET "name" = $1, "code" = $2 WHERE "id" = $3"#
    );
}

#[test]
fn newest_stamp_wins_for_repeated_key() {
    let fx = TestWorkspace::new();
    let rows = fx.load_employees(vec![
        employee_row(42, "t1", None, 100),
        employee_row(42, "t2", None, 200),
        employee_row(42, "t1-again", None, 100),
    ]);

    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| Arc::ptr_eq(r, &rows[0])));
    assert_eq!(rows[0].stamp(), Some(Value::Timestamp(200)));
    assert_eq!(rows[0].get("name").unwrap(), Value::from("t2"));
    assert_eq!(fx.table("employee").unwrap().len(), 1);
    assert_eq!(fx.stats().stale_rows_skipped(), 1);
}

#[test]
fn chunked_blob_digest_matches_single_pass() {
    let fx = TestWorkspace::with_config(Config::default().blob_chunk_size(80 * 1024));
    let data: Vec<u8> = (0..1024 * 1024).map(|i: u32| (i % 251) as u8).collect();

    let provider = fx.file_blobs(fx.scratch());
    let mut txn = fx.begin();
    let record = fx.store_blob(&provider, &mut &data[..], txn.as_mut()).unwrap();

    assert_eq!(record.size, data.len() as u64);
    assert_eq!(record.checksum.as_slice(), Sha256::digest(&data).as_slice());
    let (size, whole) = hash_reader(&mut &data[..], data.len()).unwrap();
    assert_eq!((size, whole), (record.size, record.checksum));

    let mut stored = provider.read(record.id, txn.as_mut()).unwrap();
    assert!(verify(&mut stored, &record, 4096).unwrap());
    assert_eq!(fx.stats().blob_bytes_written(), data.len() as u64);
}

#[test]
fn key_only_documents_share_one_pending_instance() {
    let fx = TestWorkspace::new();
    let first = fx.reader().read("employee", &json!({"id": 5})).unwrap();
    let second = fx.reader().read("employee", &json!({"id": 5})).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert!(first.is_pending());
    let cache = fx.table("employee").unwrap();
    assert_eq!(cache.pending_len(), 1);
    assert!(cache.get(&RowKey::Integer(5)).is_none());
}

#[test]
fn concurrent_key_only_reads_share_one_instance() {
    let fx = TestWorkspace::new();
    let report = concurrent_key_only_reads(&fx, 5, &StressConfig { threads: 8, operations: 25 });

    assert_eq!(report.operations, 200);
    assert_eq!(report.failures, 0);
    assert_eq!(report.distinct_instances, 1);
    assert_eq!(fx.table("employee").unwrap().pending_len(), 1);
}

#[test]
fn concurrent_materialization_keeps_newest_values() {
    let fx = TestWorkspace::new();
    let config = StressConfig { threads: 4, operations: 50 };
    let report = concurrent_materialization(&fx, 9, &config);

    assert_eq!(report.failures, 0);
    assert_eq!(report.distinct_instances, 1);
    let row = fx.cached("employee", 9).unwrap();
    assert_eq!(row.stamp(), Some(Value::Timestamp(200)));
    assert_eq!(row.get("name").unwrap(), Value::from("v200"));
}

#[test]
fn writing_an_instance_twice_omits_the_second() {
    let fx = TestWorkspace::new();
    let rows = fx.load_departments(&[(1, "Research", "RD")]);
    let mut writer = fx.writer(None);

    assert!(writer.write(&rows[0]).unwrap().is_some());
    assert!(writer.write(&rows[0]).unwrap().is_none());
    assert_eq!(fx.stats().objects_written(), 1);
    assert_eq!(fx.stats().objects_omitted(), 1);
}

#[test]
fn depth_zero_writes_scalars_only() {
    let fx = TestWorkspace::new();
    let departments = fx.load_departments(&[(1, "Research", "RD")]);
    fx.load_employees(vec![
        employee_row(10, "Ada", Some(1), 1),
        employee_row(11, "Bob", Some(1), 1),
    ]);

    let flat = WireOptions {
        max_depth: 0,
        ..WireOptions::default()
    };
    let document = fx.writer(Some(flat)).write(&departments[0]).unwrap().unwrap();
    assert_eq!(document, json!({"id": 1, "name": "Research", "code": "RD"}));

    let nested = fx.writer(None).write(&departments[0]).unwrap().unwrap();
    let members = nested["members"].as_array().unwrap();
    assert_eq!(members.len(), 2);
    assert_eq!(members[0]["dept"], json!(null));
    assert_eq!(members[1]["name"], json!("Bob"));
}

#[test]
fn saved_changes_reach_another_workspace() {
    let source = TestWorkspace::new();
    let row = source.create_row("employee", MANAGER).unwrap();
    row.set("id", 7i64).unwrap();
    row.set("name", "Grace").unwrap();
    let mut txn = source.begin();
    assert!(source.save(&row, txn.as_mut()).unwrap());
    txn.commit().unwrap();

    let bytes = encode_changes(&source.changes().export()).unwrap();
    let entries = decode_changes(&bytes).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].operation, ChangeOperation::Insert);
    assert_eq!(entries[0].discriminator, MANAGER);

    let target = Workspace::new(staff_schema(), Config::default());
    let fetch = target.apply_changes(&entries).unwrap();
    assert_eq!(fetch, vec![("employee".to_string(), RowKey::Integer(7))]);
    let pending = target
        .table("employee")
        .unwrap()
        .pending(&RowKey::Integer(7))
        .unwrap();

    let mut txn = source.begin();
    let loaded = target
        .load("employee", &RowKey::Integer(7), txn.as_mut())
        .unwrap()
        .unwrap();
    assert!(Arc::ptr_eq(&pending, &loaded));
    assert!(!loaded.is_pending());
    assert_eq!(loaded.item_type(), MANAGER);
    assert_eq!(loaded.get("name").unwrap(), Value::from("Grace"));
    assert_eq!(loaded.stamp(), row.stamp());
    assert_eq!(loaded.status(), RowStatus::Actual);
}

#[test]
fn detached_reads_do_not_touch_the_cache() {
    let fx = TestWorkspace::new();
    let mut cursor = department_cursor(&[(3, "Ops", "OP")]);
    let outcome = fx
        .read(&QuerySource::table("department"), &mut cursor, ReadOptions::new().detached())
        .unwrap();
    assert_eq!(outcome.primary().len(), 1);
    assert!(fx.table("department").unwrap().is_empty());
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn older_or_equal_stamps_leave_fields_unchanged(
        stamp in 1_000i64..1_000_000_000,
        age in 0i64..1_000,
        kept in name_strategy(),
        incoming in name_strategy(),
    ) {
        let fx = TestWorkspace::new();
        fx.load_employees(vec![employee_row(1, &kept, None, stamp)]);

        let mut cursor = MemoryCursor::new(
            &EMPLOYEE_COLUMNS,
            vec![employee_row(1, &incoming, Some(4), stamp - age)],
        );
        let outcome = fx
            .read(&QuerySource::table("employee"), &mut cursor, ReadOptions::new())
            .unwrap();

        prop_assert_eq!(outcome.skipped_stale, 1);
        let row = fx.cached("employee", 1).unwrap();
        prop_assert_eq!(row.get("name").unwrap(), Value::from(kept.as_str()));
        prop_assert_eq!(row.get("dept_id").unwrap(), Value::Null);
        prop_assert_eq!(row.stamp(), Some(Value::Timestamp(stamp)));
    }

    #[test]
    fn setting_and_reverting_empties_the_ledger(
        original in name_strategy(),
        edited in name_strategy(),
    ) {
        prop_assume!(original != edited);
        let fx = TestWorkspace::new();
        let row = Arc::clone(&fx.load_departments(&[(1, original.as_str(), "RD")])[0]);

        row.set("name", edited.as_str()).unwrap();
        prop_assert_eq!(row.status(), RowStatus::Edit);
        prop_assert_eq!(row.ledger().len(), 1);

        row.set("name", original.as_str()).unwrap();
        prop_assert!(row.ledger().is_empty());
        prop_assert_eq!(row.status(), RowStatus::Actual);
    }

    #[test]
    fn graph_round_trip_reproduces_fields(employee in employee_strategy()) {
        let source = TestWorkspace::new();
        let row = source.create_row("employee", employee.kind).unwrap();
        for (column, value) in EMPLOYEE_COLUMNS.iter().zip(employee.to_row()) {
            row.set(column, value).unwrap();
        }

        let deep = WireOptions {
            max_depth: 4,
            ..WireOptions::default()
        };
        let document = source.writer(Some(deep)).write(&row).unwrap().unwrap();

        let target = TestWorkspace::new();
        let back = target.reader().read("employee", &document).unwrap();
        prop_assert_eq!(back.values(), row.values());
        prop_assert_eq!(back.item_type(), employee.kind);
        prop_assert!(back.is_attached());
    }
}
