// Copyright (c) Aptos
// SPDX-License-Identifier: Apache-2.0

use chrono::Utc;
use pagebound::records::{
    column_families, OrderLine, OrderLineKey, OrderLinePrefix, OrderLineSchema, SequenceName,
    SequenceSchema, User, UserSchema,
};
use pagebound::{RecordId, ScanDirection, SchemaBatch, SchemaIterator, DB};
use tempfile::TempDir;

type S = OrderLineSchema;

fn collect_values(iter: SchemaIterator<S>) -> Vec<u32> {
    iter.map(|row| row.unwrap().value.quantity).collect()
}

fn key(order_id: u64, line: u32) -> OrderLineKey {
    OrderLineKey {
        order_id: RecordId(order_id),
        line,
    }
}

fn line(quantity: u32) -> OrderLine {
    OrderLine {
        product_id: RecordId(1),
        quantity,
        price: 1.0,
    }
}

struct TestDB {
    _tmpdir: TempDir,
    db: DB,
}

fn open_inner_db(path: &std::path::Path) -> DB {
    let mut db_opts = rocksdb::Options::default();
    db_opts.create_if_missing(true);
    db_opts.create_missing_column_families(true);
    DB::open(path, "test-iterator-db", column_families(), &db_opts).unwrap()
}

impl TestDB {
    fn new() -> Self {
        let tmpdir = tempfile::tempdir().unwrap();
        let db = open_inner_db(tmpdir.path());

        db.put::<S>(&key(1, 0), &line(100)).unwrap();
        db.put::<S>(&key(1, 2), &line(102)).unwrap();
        db.put::<S>(&key(1, 4), &line(104)).unwrap();
        db.put::<S>(&key(2, 0), &line(200)).unwrap();
        db.put::<S>(&key(2, 2), &line(202)).unwrap();
        db.put::<S>(&key(4, 0), &line(400)).unwrap();

        TestDB {
            _tmpdir: tmpdir,
            db,
        }
    }

    fn iter(&self) -> SchemaIterator<'_, S> {
        self.db.iter().expect("Failed to create iterator.")
    }

    fn rev_iter(&self) -> SchemaIterator<'_, S> {
        self.db.iter().expect("Failed to create iterator.").rev()
    }
}

impl std::ops::Deref for TestDB {
    type Target = DB;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

#[test]
fn test_seek_to_first() {
    let db = TestDB::new();
    let mut iter;

    iter = db.iter();
    iter.seek_to_first();
    assert_eq!(collect_values(iter), [100, 102, 104, 200, 202, 400]);

    // Without an explicit seek a forward iterator starts at the first key.
    iter = db.iter();
    assert_eq!(ScanDirection::Forward, iter.direction());
    assert_eq!(collect_values(iter), [100, 102, 104, 200, 202, 400]);

    // Reverse iterator from the beginning should only return the first value.
    iter = db.rev_iter();
    iter.seek_to_first();
    assert_eq!(collect_values(iter), [100]);
}

#[test]
fn test_seek_to_last() {
    let db = TestDB::new();

    let mut iter = db.iter();
    iter.seek_to_last();
    assert_eq!(collect_values(iter), [400]);

    let mut iter = db.rev_iter();
    iter.seek_to_last();
    assert_eq!(collect_values(iter), [400, 202, 200, 104, 102, 100]);

    // Without an explicit seek a backward iterator starts at the last key.
    let iter = db.rev_iter();
    assert_eq!(ScanDirection::Backward, iter.direction());
    assert_eq!(collect_values(iter), [400, 202, 200, 104, 102, 100]);
}

#[test]
fn test_seek_by_existing_key() {
    let db = TestDB::new();

    let mut iter = db.iter();
    iter.seek(&key(2, 0)).unwrap();
    assert_eq!(collect_values(iter), [200, 202, 400]);

    let mut iter = db.rev_iter();
    iter.seek(&key(2, 0)).unwrap();
    assert_eq!(collect_values(iter), [200, 104, 102, 100]);
}

#[test]
fn test_seek_by_nonexistent_key() {
    let db = TestDB::new();

    let mut iter = db.iter();
    iter.seek(&key(2, 1)).unwrap();
    assert_eq!(collect_values(iter), [202, 400]);

    let mut iter = db.rev_iter();
    iter.seek(&key(2, 1)).unwrap();
    assert_eq!(collect_values(iter), [202, 200, 104, 102, 100]);
}

#[test]
fn test_seek_for_prev_by_existing_key() {
    let db = TestDB::new();

    let mut iter = db.iter();
    iter.seek_for_prev(&key(2, 0)).unwrap();
    assert_eq!(collect_values(iter), [200, 202, 400]);

    let mut iter = db.rev_iter();
    iter.seek_for_prev(&key(2, 0)).unwrap();
    assert_eq!(collect_values(iter), [200, 104, 102, 100]);
}

#[test]
fn test_seek_for_prev_by_nonexistent_key() {
    let db = TestDB::new();

    let mut iter = db.iter();
    iter.seek_for_prev(&key(2, 1)).unwrap();
    assert_eq!(collect_values(iter), [200, 202, 400]);

    let mut iter = db.rev_iter();
    iter.seek_for_prev(&key(2, 1)).unwrap();
    assert_eq!(collect_values(iter), [200, 104, 102, 100]);
}

#[test]
fn test_seek_by_order_prefix() {
    let db = TestDB::new();

    let mut iter = db.iter();
    iter.seek(&OrderLinePrefix(RecordId(2))).unwrap();
    assert_eq!(collect_values(iter), [200, 202, 400]);

    // No order 3: the seek lands on the next order.
    let mut iter = db.iter();
    iter.seek(&OrderLinePrefix(RecordId(3))).unwrap();
    assert_eq!(collect_values(iter), [400]);

    let mut iter = db.rev_iter();
    iter.seek(&OrderLinePrefix(RecordId(2))).unwrap();
    assert_eq!(collect_values(iter), [200, 104, 102, 100]);
}

#[test]
fn test_seek_for_prev_by_order_prefix() {
    let db = TestDB::new();

    // The bare prefix sorts before every full key that starts with it.
    let mut iter = db.iter();
    iter.seek_for_prev(&OrderLinePrefix(RecordId(2))).unwrap();
    assert_eq!(collect_values(iter), [104, 200, 202, 400]);

    let mut iter = db.rev_iter();
    iter.seek_for_prev(&OrderLinePrefix(RecordId(3))).unwrap();
    assert_eq!(collect_values(iter), [202, 200, 104, 102, 100]);
}

#[test]
fn test_seek_past_either_end() {
    let db = TestDB::new();

    let mut iter = db.iter();
    iter.seek(&key(9, 0)).unwrap();
    assert!(collect_values(iter).is_empty());

    let mut iter = db.rev_iter();
    iter.seek_for_prev(&OrderLinePrefix(RecordId(0))).unwrap();
    assert!(collect_values(iter).is_empty());
}

#[test]
fn test_record_id_keys_iterate_numerically_in_both_directions() {
    let tmpdir = tempfile::tempdir().unwrap();
    let db = open_inner_db(tmpdir.path());
    for id in [1u64, 5, 9, 300] {
        let user = User {
            user_id: RecordId(id),
            name: format!("User {id}"),
            email: format!("user{id}@example.com"),
            created_at: Utc::now(),
        };
        db.put::<UserSchema>(&user.user_id, &user).unwrap();
    }
    let ids = |iter: SchemaIterator<UserSchema>| -> Vec<u64> {
        iter.map(|row| row.unwrap().key.0).collect()
    };

    let iter = db
        .iter_with_direction::<UserSchema>(ScanDirection::Forward)
        .unwrap();
    assert_eq!(ids(iter), [1, 5, 9, 300]);

    let mut iter = db
        .iter_with_direction::<UserSchema>(ScanDirection::Forward)
        .unwrap();
    iter.seek(&RecordId(6)).unwrap();
    assert_eq!(ids(iter), [9, 300]);

    let mut iter = db
        .iter_with_direction::<UserSchema>(ScanDirection::Backward)
        .unwrap();
    iter.seek_for_prev(&RecordId(6)).unwrap();
    assert_eq!(ids(iter), [5, 1]);
}

#[test]
fn test_schema_batch_is_applied_atomically_across_column_families() {
    let db = TestDB::new();
    let sequence = SequenceName::of::<S>();

    let mut batch = SchemaBatch::new();
    batch.put::<S>(&key(4, 1), &line(401)).unwrap();
    batch.delete::<S>(&key(1, 0)).unwrap();
    batch.put::<SequenceSchema>(&sequence, &RecordId(4)).unwrap();
    // Later operations on the same key win.
    batch.put::<S>(&key(1, 2), &line(1)).unwrap();
    batch.put::<S>(&key(1, 2), &line(112)).unwrap();
    assert_eq!(4, batch.len());
    db.write_schemas(&batch).unwrap();

    assert_eq!(collect_values(db.iter()), [112, 104, 200, 202, 400, 401]);
    assert_eq!(
        Some(RecordId(4)),
        db.get::<SequenceSchema>(&sequence).unwrap()
    );
}
