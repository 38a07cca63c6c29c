//! Unit tests for tables, queries and blobs on in-memory SQLite.

use std::io::Read;

use serde_json::{json, Value};

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::filter::{op, Filter, Predicate};
use crate::pool::{SessionPool, SqliteDb};
use crate::row::{row_data, Row};
use crate::schema::Schema;
use crate::uri::MEMORY;
use crate::{BlobChunks, BLOB_CHUNK_SIZE};

/// Creates an in-memory database with an empty `person` table committed.
fn test_db() -> SqliteDb {
    test_db_with(&DatabaseConfig::default())
}

fn test_db_with(config: &DatabaseConfig) -> SqliteDb {
    let db = SqliteDb::new(MEMORY, config, Schema::new()).expect("should open in-memory db");
    let session = db.session().expect("session should open");
    session
        .table("person")
        .create_table()
        .expect("create_table should succeed");
    session.commit().expect("commit should succeed");
    drop(session);
    db
}

fn ids(rows: &[Row<'_>]) -> Vec<i64> {
    rows.iter().filter_map(Row::id).collect()
}

fn collect<'s>(rows: impl Iterator<Item = Result<Row<'s>>>) -> Vec<Row<'s>> {
    rows.collect::<Result<Vec<_>>>().expect("scan should succeed")
}

// ── CRUD ────────────────────────────────────────────────────────────

#[test]
fn saved_row_loads_back() {
    let db = test_db();
    let session = db.session().expect("session should open");
    let person = session.table("person");

    let row = person
        .new([("hello", "world"), ("x", "y")])
        .expect("insert should succeed");
    assert_eq!(row.id(), Some(1));
    session.commit().expect("commit should succeed");

    let loaded = person.get(1).expect("row should exist");
    assert_eq!(loaded, row_data([("hello", "world"), ("x", "y")]));
    assert_eq!(loaded.table().name(), "person");
}

#[test]
fn ids_increase_per_table() {
    let db = test_db();
    let session = db.session().expect("session should open");
    let person = session.table("person");

    let first = person.new([("n", "1")]).expect("insert");
    let second = person.new([("n", "2")]).expect("insert");
    assert_eq!(first.id(), Some(1));
    assert_eq!(second.id(), Some(2));

    // Deleted ids are not handed out again.
    second.delete().expect("delete");
    let third = person.new([("n", "3")]).expect("insert");
    assert_eq!(third.id(), Some(3));
}

#[test]
fn row_save_updates_in_place() {
    let db = test_db();
    let session = db.session().expect("session should open");
    let person = session.table("person");

    let mut row = person.new([("name", "Joe")]).expect("insert");
    row.insert("city".to_string(), json!("Bucharest"));
    row.insert("name".to_string(), json!("Joseph"));
    row.save().expect("update should succeed");
    assert_eq!(row.id(), Some(1), "update keeps the id");

    let loaded = person.get(1).expect("row should exist");
    assert_eq!(loaded, row_data([("city", "Bucharest"), ("name", "Joseph")]));
    assert_eq!(person.query().count().expect("count"), 1);
}

#[test]
fn unsaved_row_gets_id_on_save() {
    let db = test_db();
    let session = db.session().expect("session should open");
    let person = session.table("person");

    let mut row = person.new([("a", "b")]).expect("insert");
    let mut copy = Row::new(person.clone(), None, row.data().clone());
    assert_eq!(copy.id(), None);
    copy.delete().expect("deleting an unsaved row is a no-op");

    person.save(&mut copy).expect("insert should succeed");
    assert_eq!(copy.id(), Some(2));

    row.save().expect("re-saving an unchanged row succeeds");
    assert_eq!(person.query().count().expect("count"), 2);
}

#[test]
fn deleted_row_is_gone() {
    let db = test_db();
    let session = db.session().expect("session should open");
    let person = session.table("person");

    person.new([("a", "1")]).expect("insert");
    person.new([("a", "2")]).expect("insert");
    person.delete(1).expect("delete should succeed");
    person.delete(1).expect("deleting again is a no-op");

    let err = person.get(1).expect_err("row should be gone");
    assert!(matches!(
        err,
        Error::RowNotFound { ref table, id: Some(1) } if table == "person"
    ));
    assert_eq!(person.get(2).expect("other row stays")["a"], json!("2"));
}

#[test]
fn unusual_keys_and_values_survive() {
    let db = test_db();
    let session = db.session().expect("session should open");
    let person = session.table("person");

    let data = row_data([
        ("'; DROP TABLE person; --", "\"quoted\" and 'single'"),
        ("ünïcødé ключ", "値 ☃"),
        ("back\\slash", "new\nline\ttab"),
        ("", "empty key"),
        ("=>", "hstore => arrow, \"comma\""),
    ]);
    let row = person.new(data.clone()).expect("insert");
    let id = row.id().expect("saved row has an id");

    assert_eq!(person.get(id).expect("row should exist"), data);
    let found = person
        .find_single([("ünïcødé ключ", "値 ☃")])
        .expect("exact match on unicode");
    assert_eq!(found.id(), Some(id));
}

#[test]
fn non_string_values_round_trip_outside_debug_mode() {
    let db = test_db();
    let session = db.session().expect("session should open");
    let person = session.table("person");

    let row = person
        .new([("age", json!(42)), ("tags", json!(["a", "b"])), ("none", Value::Null)])
        .expect("insert");
    let loaded = person.get(row.id().expect("id")).expect("row should exist");
    assert_eq!(loaded["age"], json!(42));
    assert_eq!(loaded["tags"], json!(["a", "b"]));
    assert_eq!(loaded["none"], Value::Null);
}

#[test]
fn debug_mode_rejects_non_string_values() {
    let db = test_db_with(&DatabaseConfig::default().with_debug(true));
    let session = db.session().expect("session should open");
    let person = session.table("person");

    let err = person
        .new([("name", json!("Joe")), ("age", json!(42))])
        .expect_err("debug mode should reject numbers");
    assert!(matches!(err, Error::InvalidRowData { ref key } if key == "age"));
    assert_eq!(person.query().count().expect("count"), 0);

    let mut row = person.new([("name", "Joe")]).expect("strings are fine");
    row.insert("age".to_string(), json!(42));
    assert!(matches!(row.save(), Err(Error::InvalidRowData { .. })));
    assert_eq!(person.get(1).expect("row stays")["name"], json!("Joe"));
}

// ── Missing tables ──────────────────────────────────────────────────

#[test]
fn missing_table_is_reported_for_every_operation() {
    let db = test_db();
    let session = db.session().expect("session should open");
    let ghost = session.table("ghost");

    let is_missing = |err: Error| matches!(err, Error::MissingTable(ref name) if name == "ghost");

    assert!(is_missing(ghost.new([("a", "b")]).expect_err("insert")));
    assert!(is_missing(ghost.get(1).expect_err("get")));
    assert!(is_missing(ghost.delete(1).expect_err("delete")));
    assert!(is_missing(ghost.query().count().expect_err("count")));
    assert!(is_missing(ghost.find_first(Filter::all()).expect_err("find_first")));

    let mut scan = ghost.find(Filter::all());
    assert!(is_missing(
        scan.next().expect("scan yields the error").expect_err("scan")
    ));
    assert!(scan.next().is_none(), "scan stops after an error");
}

#[test]
fn missing_table_leaves_session_usable() {
    let db = test_db();
    let session = db.session().expect("session should open");

    assert!(session.table("ghost").get(1).is_err());
    session.table("ghost").create_table().expect("create");
    session.table("ghost").new([("a", "b")]).expect("insert");
    session.commit().expect("commit");
}

#[test]
fn invalid_table_names_never_reach_sql() {
    let db = test_db();
    let session = db.session().expect("session should open");

    for bad in ["person; DROP TABLE person", "two words", "1st", ""] {
        let err = session.table(bad).create_table().expect_err("should be rejected");
        assert!(matches!(err, Error::InvalidTableName(ref name) if name == bad));
    }
}

#[test]
fn drop_table_removes_rows() {
    let db = test_db();
    let session = db.session().expect("session should open");
    let person = session.table("person");

    person.new([("a", "b")]).expect("insert");
    person.drop_table().expect("drop");
    person.drop_table().expect("dropping twice is fine");
    assert!(matches!(person.get(1), Err(Error::MissingTable(_))));

    person.create_table().expect("recreate");
    assert_eq!(person.query().count().expect("count"), 0);
}

// ── find / find_first / find_single ─────────────────────────────────

fn seed_people(session: &crate::Session) {
    let person = session.table("person");
    for (name, city) in [
        ("Joe", "Bucharest"),
        ("Ann", "Cluj"),
        ("Jim", "Bucharest"),
        ("Bob", "Iasi"),
    ] {
        person.new([("name", name), ("city", city)]).expect("insert");
    }
    person.new([("nickname", "Ghost")]).expect("insert");
}

#[test]
fn find_without_filter_yields_all_rows_in_id_order() {
    let db = test_db();
    let session = db.session().expect("session should open");
    seed_people(&session);

    let rows = collect(session.table("person").find(Filter::all()));
    assert_eq!(ids(&rows), vec![1, 2, 3, 4, 5]);
}

#[test]
fn find_combines_terms_with_and() {
    let db = test_db();
    let session = db.session().expect("session should open");
    seed_people(&session);
    let person = session.table("person");

    let rows = collect(person.find([("city", "Bucharest")]));
    assert_eq!(ids(&rows), vec![1, 3]);

    let rows = collect(person.find([("city", "Bucharest"), ("name", "Jim")]));
    assert_eq!(ids(&rows), vec![3]);

    let rows = collect(person.find([("city", "Bucharest"), ("name", "Ann")]));
    assert!(rows.is_empty());
}

#[test]
fn rows_without_the_filtered_key_never_match() {
    let db = test_db();
    let session = db.session().expect("session should open");
    seed_people(&session);
    let person = session.table("person");

    assert!(collect(person.find([("name", "")])).is_empty());
    assert!(collect(person.find([("name", op::re(""))]))
        .iter()
        .all(|row| row.contains_key("name")));
    assert_eq!(person.query().filter([("name", op::re(""))]).count().expect("count"), 4);
}

#[test]
fn regex_terms_are_unanchored() {
    let db = test_db();
    let session = db.session().expect("session should open");
    seed_people(&session);
    let person = session.table("person");

    let rows = collect(person.find([("name", op::re("^J"))]));
    assert_eq!(ids(&rows), vec![1, 3]);

    let rows = collect(person.find([("city", op::re("u"))]));
    assert_eq!(ids(&rows), vec![1, 2, 3]);

    let filter = Filter::all().re("city", "^Buc").eq("name", "Joe");
    assert_eq!(ids(&collect(person.find(filter))), vec![1]);

    let mixed: Vec<(&str, Predicate)> = vec![("name", op::re("o")), ("city", "Iasi".into())];
    assert_eq!(ids(&collect(person.find(mixed))), vec![4]);
}

#[test]
fn scalars_match_by_their_text_form() {
    let db = test_db();
    let session = db.session().expect("session should open");
    let person = session.table("person");

    person.new([("n", json!(42))]).expect("insert");
    person.new([("n", "42")]).expect("insert");
    person.new([("n", json!(true))]).expect("insert");
    person.new([("n", Value::Null)]).expect("insert");

    assert_eq!(ids(&collect(person.find([("n", "42")]))), vec![1, 2]);
    assert_eq!(ids(&collect(person.find([("n", op::re("4"))]))), vec![1, 2]);
    assert_eq!(ids(&collect(person.find([("n", "true")]))), vec![3]);
    assert!(collect(person.find([("n", "null")])).is_empty());
}

#[test]
fn order_by_compares_bytes() {
    let db = test_db();
    let session = db.session().expect("session should open");
    let person = session.table("person");
    for name in ["b", "B", "a"] {
        person.new([("name", name)]).expect("insert");
    }

    let rows = person.query().order_by("name").fetch().expect("fetch");
    assert_eq!(ids(&rows), vec![2, 3, 1]);
}

#[test]
fn find_pages_through_large_tables() {
    let config = DatabaseConfig {
        scan_page_size: 2,
        ..DatabaseConfig::default()
    };
    let db = test_db_with(&config);
    let session = db.session().expect("session should open");
    let person = session.table("person");
    for i in 0..7 {
        let parity = if i % 2 == 0 { "even" } else { "odd" };
        person
            .new([("i", i.to_string()), ("parity", parity.to_string())])
            .expect("insert");
    }

    assert_eq!(collect(person.find(Filter::all())).len(), 7);
    let even = collect(person.find([("parity", "even")]));
    assert_eq!(ids(&even), vec![1, 3, 5, 7]);
}

#[test]
fn find_reflects_current_contents_each_time() {
    let db = test_db();
    let session = db.session().expect("session should open");
    let person = session.table("person");
    person.new([("a", "1")]).expect("insert");

    assert_eq!(person.find(Filter::all()).count(), 1);
    person.new([("a", "2")]).expect("insert");
    assert_eq!(person.find(Filter::all()).count(), 2);
}

#[test]
fn find_first_picks_lowest_id() {
    let db = test_db();
    let session = db.session().expect("session should open");
    seed_people(&session);
    let person = session.table("person");

    let row = person.find_first([("city", "Bucharest")]).expect("should match");
    assert_eq!(row.id(), Some(1));

    let err = person
        .find_first([("city", "Timisoara")])
        .expect_err("nothing matches");
    assert!(matches!(err, Error::RowNotFound { id: None, .. }));
}

#[test]
fn find_single_requires_exactly_one_match() {
    let db = test_db();
    let session = db.session().expect("session should open");
    seed_people(&session);
    let person = session.table("person");

    let row = person.find_single([("name", "Ann")]).expect("one match");
    assert_eq!(row["city"], json!("Cluj"));

    assert!(matches!(
        person.find_single([("name", "Zed")]),
        Err(Error::RowNotFound { .. })
    ));
    assert!(matches!(
        person.find_single([("city", "Bucharest")]),
        Err(Error::MultipleRowsFound { ref table }) if table == "person"
    ));
}

// ── query ───────────────────────────────────────────────────────────

#[test]
fn query_orders_by_string_value() {
    let db = test_db();
    let session = db.session().expect("session should open");
    seed_people(&session);

    let rows = session
        .table("person")
        .query()
        .order_by("name")
        .fetch()
        .expect("fetch");
    // The row without a name sorts as the empty string.
    assert_eq!(ids(&rows), vec![5, 2, 4, 3, 1]);
}

#[test]
fn query_ties_keep_id_order() {
    let db = test_db();
    let session = db.session().expect("session should open");
    seed_people(&session);

    let rows = session
        .table("person")
        .query()
        .filter([("name", op::re("."))])
        .order_by("city")
        .fetch()
        .expect("fetch");
    assert_eq!(ids(&rows), vec![1, 3, 2, 4]);
}

#[test]
fn query_applies_offset_then_limit() {
    let db = test_db();
    let session = db.session().expect("session should open");
    seed_people(&session);
    let person = session.table("person");

    let page = person.query().order_by("name").offset(1).limit(2).fetch().expect("fetch");
    assert_eq!(ids(&page), vec![2, 4]);

    let tail = person.query().offset(3).fetch().expect("fetch");
    assert_eq!(ids(&tail), vec![4, 5]);

    let head = person.query().limit(2).fetch().expect("fetch");
    assert_eq!(ids(&head), vec![1, 2]);

    assert!(person.query().limit(0).fetch().expect("fetch").is_empty());
    assert!(person.query().offset(10).fetch().expect("fetch").is_empty());
}

#[test]
fn count_ignores_order_and_paging() {
    let db = test_db();
    let session = db.session().expect("session should open");
    seed_people(&session);
    let person = session.table("person");

    assert_eq!(person.query().count().expect("count"), 5);
    assert_eq!(
        person
            .query()
            .filter([("city", "Bucharest")])
            .order_by("name")
            .offset(1)
            .limit(1)
            .count()
            .expect("count"),
        2
    );
}

// ── Transactions ────────────────────────────────────────────────────

#[test]
fn rollback_discards_uncommitted_rows() {
    let db = test_db();
    let session = db.session().expect("session should open");
    let person = session.table("person");

    person.new([("kept", "yes")]).expect("insert");
    session.commit().expect("commit");
    person.new([("kept", "no")]).expect("insert");
    session.rollback().expect("rollback");

    let rows = collect(person.find(Filter::all()));
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["kept"], json!("yes"));
}

#[test]
fn committed_rows_are_visible_to_later_sessions() {
    let db = test_db();
    {
        let session = db.session().expect("session should open");
        session.table("person").new([("a", "b")]).expect("insert");
        session.commit().expect("commit");
    }

    let session = db.session().expect("session should open");
    let rows = collect(session.table("person").find(Filter::all()));
    assert_eq!(rows.len(), 1);
}

#[test]
fn putting_back_a_session_keeps_another_sessions_writes() {
    let db = test_db();
    let writer = db.get_session(false).expect("session should open");
    writer.table("person").new([("hello", "world")]).expect("insert");

    let other = db.get_session(false).expect("session should open");
    db.put_session(&other);

    let row = writer
        .table("person")
        .get(1)
        .expect("writer still reads its own uncommitted row");
    assert_eq!(row, row_data([("hello", "world")]));
    writer.commit().expect("commit");
    db.put_session(&writer);

    let session = db.session().expect("session should open");
    assert_eq!(session.table("person").query().count().expect("count"), 1);
}

#[test]
fn sessions_of_one_memory_database_share_a_transaction() {
    let db = test_db();
    {
        let session = db.session().expect("session should open");
        session.table("person").new([("pending", "yes")]).expect("insert");
    }

    let session = db.session().expect("session should open");
    let person = session.table("person");
    assert_eq!(person.query().count().expect("count"), 1);
    session.rollback().expect("rollback");
    assert_eq!(person.query().count().expect("count"), 0);
}

#[test]
fn lazy_session_works_like_an_eager_one() {
    let db = test_db();
    let session = db.get_session(true).expect("lazy session should open");
    assert!(!session.is_connected());

    session.table("person").new([("a", "b")]).expect("insert");
    assert!(session.is_connected());
    session.commit().expect("commit");
    db.put_session(&session);

    assert!(matches!(
        session.table("person").get(1),
        Err(Error::ExpiredSession)
    ));
}

// ── Blobs ───────────────────────────────────────────────────────────

#[test]
fn blob_contents_round_trip() {
    let db = test_db();
    let session = db.session().expect("session should open");

    let blob = session.new_blob().expect("allocate");
    assert!(blob.read_to_vec().expect("read").is_empty(), "new blobs are empty");

    blob.save_from(&b"hello blob"[..]).expect("save");
    let reopened = session.open_blob(blob.id().clone());
    assert_eq!(reopened.read_to_vec().expect("read"), b"hello blob");

    blob.save_from(&b"replaced"[..]).expect("save again");
    assert_eq!(reopened.read_to_vec().expect("read"), b"replaced");
}

#[test]
fn large_blobs_stream_in_chunks() {
    let db = test_db();
    let session = db.session().expect("session should open");

    let data: Vec<u8> = (0..BLOB_CHUNK_SIZE * 2 + 10).map(|i| (i % 251) as u8).collect();
    let blob = session.new_blob().expect("allocate");
    blob.save_from(data.as_slice()).expect("save");

    let chunks: Vec<Vec<u8>> = blob
        .iter_data()
        .expect("open")
        .collect::<Result<_>>()
        .expect("read");
    let sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![BLOB_CHUNK_SIZE, BLOB_CHUNK_SIZE, 10]);
    assert_eq!(chunks.concat(), data);
}

#[test]
fn blobs_are_shared_between_sessions() {
    let db = test_db();
    let id = {
        let session = db.session().expect("session should open");
        let blob = session.new_blob().expect("allocate");
        blob.save_from(&b"shared"[..]).expect("save");
        blob.id().clone()
    };

    let session = db.session().expect("session should open");
    assert_eq!(
        session.open_blob(id).read_to_vec().expect("read"),
        b"shared"
    );
}

/// Presents a blob's chunk stream as a byte reader.
struct ChunkReader<'s> {
    chunks: BlobChunks<'s>,
    pending: Vec<u8>,
    pos: usize,
}

impl<'s> ChunkReader<'s> {
    fn new(chunks: BlobChunks<'s>) -> Self {
        Self {
            chunks,
            pending: Vec::new(),
            pos: 0,
        }
    }
}

impl Read for ChunkReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        while self.pos == self.pending.len() {
            match self.chunks.next() {
                Some(Ok(chunk)) => {
                    self.pending = chunk;
                    self.pos = 0;
                }
                Some(Err(e)) => return Err(std::io::Error::other(e)),
                None => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len() - self.pos);
        buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[test]
fn blob_copies_from_another_blob_of_the_same_session() {
    let db = test_db();
    let session = db.session().expect("session should open");

    let data: Vec<u8> = (0..BLOB_CHUNK_SIZE + 300).map(|i| (i % 253) as u8).collect();
    let source = session.new_blob().expect("allocate");
    source.save_from(data.as_slice()).expect("save");

    let copy = session.new_blob().expect("allocate");
    let reader = ChunkReader::new(source.iter_data().expect("open"));
    copy.save_from(reader).expect("copy");
    assert_eq!(copy.read_to_vec().expect("read"), data);
}

#[test]
fn deleted_blobs_cannot_be_read() {
    let db = test_db();
    let session = db.session().expect("session should open");

    let first = session.new_blob().expect("allocate");
    let second = session.new_blob().expect("allocate");
    assert_ne!(first.id(), second.id());

    session.delete_blob(first.id()).expect("delete");
    assert!(matches!(first.read_to_vec(), Err(Error::BlobNotFound(_))));
    assert!(matches!(
        session.delete_blob(first.id()),
        Err(Error::BlobNotFound(_))
    ));

    session.delete_all_blobs().expect("delete all");
    assert!(matches!(
        second.save_from(&b"late"[..]),
        Err(Error::BlobNotFound(_))
    ));
}

// ── Schema ──────────────────────────────────────────────────────────

#[test]
fn schema_tables_are_created_and_dropped_together() {
    let schema = Schema::new()
        .define_table("Person", "person")
        .define_table("Order", "orders");
    let db = SqliteDb::new(MEMORY, &DatabaseConfig::default(), schema).expect("should open");
    let session = db.session().expect("session should open");

    session.create_all().expect("create_all");
    session.table("Order").new([("total", "10")]).expect("insert");
    session.table("Person").new([("name", "Joe")]).expect("insert");
    let blob = session.new_blob().expect("allocate");

    session.drop_all().expect("drop_all");
    assert!(matches!(
        session.table("orders").get(1),
        Err(Error::MissingTable(ref name)) if name == "orders"
    ));
    assert!(matches!(blob.read_to_vec(), Err(Error::BlobNotFound(_))));
}

// ── End to end ──────────────────────────────────────────────────────

#[test]
fn end_to_end_save_load_delete() {
    let db = SqliteDb::in_memory().expect("should open in-memory db");
    {
        let session = db.session().expect("session should open");
        let person = session.table("person");
        person.create_table().expect("create");
        person.new([("hello", "world")]).expect("insert");
        session.commit().expect("commit");
    }

    let session = db.session().expect("session should open");
    let person = session.table("person");
    assert_eq!(person.get(1).expect("get"), row_data([("hello", "world")]));
    person.delete(1).expect("delete");
    assert!(matches!(person.get(1), Err(Error::RowNotFound { .. })));
}

#[test]
fn end_to_end_contact_book() {
    crate::logging::init_for_tests("htables=debug");
    let db = test_db();

    {
        let session = db.session().expect("session should open");
        let person = session.table("person");
        person
            .new([("name", "Joe"), ("email", "joe@example.com")])
            .expect("insert");
        person
            .new([("name", "Ann"), ("email", "ann@example.org")])
            .expect("insert");

        let photo = session.new_blob().expect("allocate");
        photo.save_from(&b"\x89PNG..."[..]).expect("save");
        let mut joe = person.find_single([("name", "Joe")]).expect("joe");
        joe.insert("photo".to_string(), json!(photo.id().to_string()));
        joe.save().expect("update");
        session.commit().expect("commit");
    }

    let session = db.session().expect("session should open");
    let person = session.table("person");
    let org = collect(person.find([("email", op::re(r"\.org$"))]));
    assert_eq!(ids(&org), vec![2]);

    let joe = person.get(1).expect("joe");
    let token = joe["photo"].as_str().expect("photo id is a string");
    let photo = session.open_blob(crate::BlobId::Token(token.to_string()));
    assert_eq!(photo.read_to_vec().expect("read"), b"\x89PNG...");

    let sorted = person.query().order_by("email").fetch().expect("fetch");
    assert_eq!(ids(&sorted), vec![2, 1]);
}
