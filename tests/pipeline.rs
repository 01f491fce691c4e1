use anyhow::Result;
use csv_dbload::{
    pipeline::{
        FixedPolicy, LoadOutcome, RecoveryPolicy, RowDecision, RowError, RowSource, run_load,
    },
    reconcile::{ColumnMapping, reconcile},
    schema::{SchemaDescriptor, SchemaError},
    store::{SqliteStore, TransactionController},
};

/// In-memory row source standing in for a parsed file.
struct VecRowSource {
    header: Vec<String>,
    rows: std::vec::IntoIter<Vec<String>>,
}

impl VecRowSource {
    fn new(header: &[&str], rows: &[&[&str]]) -> Self {
        Self {
            header: header.iter().map(|f| f.to_string()).collect(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|f| f.to_string()).collect())
                .collect::<Vec<_>>()
                .into_iter(),
        }
    }
}

impl RowSource for VecRowSource {
    fn header_fields(&mut self) -> Result<Vec<String>> {
        Ok(self.header.clone())
    }

    fn next_row(&mut self) -> Result<Option<Vec<String>>> {
        Ok(self.rows.next())
    }
}

/// Policy that records every failure it is asked about.
struct RecordingPolicy {
    decision: RowDecision,
    seen: Vec<(u64, String)>,
}

impl RecordingPolicy {
    fn new(decision: RowDecision) -> Self {
        Self {
            decision,
            seen: Vec::new(),
        }
    }
}

impl RecoveryPolicy for RecordingPolicy {
    fn on_row_error(&mut self, row_ordinal: u64, error: &RowError) -> RowDecision {
        self.seen.push((row_ordinal, error.to_string()));
        self.decision
    }
}

fn people_store() -> SqliteStore {
    let store = SqliteStore::open_in_memory().expect("in-memory store");
    store
        .connection()
        .execute_batch(
            "CREATE TABLE people (
                id INTEGER NOT NULL,
                name TEXT,
                created TIMESTAMP
            )",
        )
        .expect("create table");
    store
}

fn prepared(store: &mut SqliteStore, source: &mut VecRowSource) -> ColumnMapping {
    let schema = store.columns("people").expect("schema");
    let header = source.header_fields().expect("header");
    let mapping = reconcile(&header, &schema).expect("mapping");
    store.prepare_insert("people", &mapping).expect("prepare");
    store.begin().expect("begin");
    mapping
}

fn ids(store: &SqliteStore) -> Vec<i64> {
    let mut stmt = store
        .connection()
        .prepare("SELECT id FROM people ORDER BY id")
        .expect("prepare select");
    stmt.query_map([], |row| row.get(0))
        .expect("query")
        .collect::<rusqlite::Result<Vec<i64>>>()
        .expect("collect")
}

#[test]
fn skip_keeps_good_rows_and_drops_the_failed_one() {
    let mut store = people_store();
    let mut source = VecRowSource::new(
        &["id", "name", "created"],
        &[
            &["1", "Alice", "2024-01-02 10:30"],
            &["x", "Bob", "2024-01-02 10:31"],
            &["3", "Carol", "null"],
        ],
    );
    let mapping = prepared(&mut store, &mut source);

    let mut policy = RecordingPolicy::new(RowDecision::Skip);
    let summary = run_load(&mut source, &mut store, &mapping, &mut policy).expect("load");

    assert_eq!(summary.rows_read, 3);
    assert_eq!(summary.rows_inserted, 2);
    assert_eq!(summary.rows_skipped, 1);
    assert_eq!(summary.outcome, LoadOutcome::Completed);
    assert_eq!(policy.seen.len(), 1);
    assert_eq!(policy.seen[0].0, 2);
    assert!(policy.seen[0].1.contains("'id'"), "{}", policy.seen[0].1);

    store.commit().expect("commit");
    assert_eq!(ids(&store), vec![1, 3]);
}

#[test]
fn abort_rolls_back_every_insert_including_earlier_successes() {
    let mut store = people_store();
    let mut source = VecRowSource::new(
        &["id", "name", "created"],
        &[
            &["1", "Alice", "2024-01-02 10:30"],
            &["x", "Bob", "2024-01-02 10:31"],
            &["3", "Carol", "null"],
        ],
    );
    let mapping = prepared(&mut store, &mut source);

    let mut policy = FixedPolicy(RowDecision::Abort);
    let summary = run_load(&mut source, &mut store, &mapping, &mut policy).expect("load");

    assert_eq!(summary.rows_inserted, 0);
    match summary.outcome {
        LoadOutcome::Aborted { row_ordinal, ref reason } => {
            assert_eq!(row_ordinal, 2);
            assert!(reason.contains("'x'"), "{reason}");
        }
        LoadOutcome::Completed => panic!("expected abort"),
    }
    // Rollback already happened inside the pipeline.
    assert_eq!(ids(&store), Vec::<i64>::new());
}

#[test]
fn ragged_rows_surface_as_structural_errors() {
    let mut store = people_store();
    let mut source = VecRowSource::new(
        &["id", "name", "created"],
        &[
            &["1", "Alice"],
            &["2", "Bob", "null", "extra"],
            &["3", "Carol", "null"],
        ],
    );
    let mapping = prepared(&mut store, &mut source);

    let mut policy = RecordingPolicy::new(RowDecision::Skip);
    let summary = run_load(&mut source, &mut store, &mapping, &mut policy).expect("load");

    assert_eq!(summary.rows_inserted, 1);
    assert_eq!(summary.rows_skipped, 2);
    assert!(policy.seen[0].1.contains("2 field(s)"), "{}", policy.seen[0].1);
    assert!(policy.seen[1].1.contains("4 field(s)"), "{}", policy.seen[1].1);

    store.commit().expect("commit");
    assert_eq!(ids(&store), vec![3]);
}

#[test]
fn store_rejections_are_recoverable_per_row() {
    let mut store = people_store();
    // id is NOT NULL, so the explicit null marker is rejected at execution.
    let mut source = VecRowSource::new(
        &["id", "name", "created"],
        &[
            &["1", "Alice", "null"],
            &["null", "Bob", "null"],
            &["3", "Carol", "null"],
        ],
    );
    let mapping = prepared(&mut store, &mut source);

    let mut policy = RecordingPolicy::new(RowDecision::Skip);
    let summary = run_load(&mut source, &mut store, &mapping, &mut policy).expect("load");

    assert_eq!(summary.rows_inserted, 2);
    assert_eq!(summary.rows_skipped, 1);
    assert!(
        policy.seen[0].1.contains("rejected"),
        "{}",
        policy.seen[0].1
    );

    store.commit().expect("commit");
    assert_eq!(ids(&store), vec![1, 3]);
}

#[test]
fn unmatched_destination_columns_receive_null() {
    let mut store = people_store();
    let mut source = VecRowSource::new(&["id"], &[&["7"]]);
    let mapping = prepared(&mut store, &mut source);
    assert_eq!(mapping.missing_destination_columns.len(), 2);

    let mut policy = FixedPolicy(RowDecision::Abort);
    let summary = run_load(&mut source, &mut store, &mapping, &mut policy).expect("load");
    assert_eq!(summary.outcome, LoadOutcome::Completed);
    store.commit().expect("commit");

    let (name, created): (Option<String>, Option<String>) = store
        .connection()
        .query_row("SELECT name, created FROM people WHERE id = 7", [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .expect("select");
    assert_eq!(name, None);
    assert_eq!(created, None);
}

#[test]
fn reordered_source_fields_bind_to_the_right_columns() {
    let mut store = people_store();
    let mut source = VecRowSource::new(
        &["Name", "ID"],
        &[&["Alice", "7"], &["Bob", "8"]],
    );
    let mapping = prepared(&mut store, &mut source);

    let mut policy = FixedPolicy(RowDecision::Abort);
    run_load(&mut source, &mut store, &mapping, &mut policy).expect("load");
    store.commit().expect("commit");

    let name: String = store
        .connection()
        .query_row("SELECT name FROM people WHERE id = 7", [], |row| row.get(0))
        .expect("select");
    assert_eq!(name, "Alice");
    assert_eq!(ids(&store), vec![7, 8]);
}

#[test]
fn skip_then_abort_still_undoes_everything() {
    let mut store = people_store();
    let mut source = VecRowSource::new(
        &["id", "name", "created"],
        &[
            &["1", "Alice", "null"],
            &["x", "Bob", "null"],
            &["3", "Carol", "null"],
            &["y", "Dave", "null"],
        ],
    );
    let mapping = prepared(&mut store, &mut source);

    struct SkipThenAbort(u32);
    impl RecoveryPolicy for SkipThenAbort {
        fn on_row_error(&mut self, _row: u64, _error: &RowError) -> RowDecision {
            self.0 += 1;
            if self.0 == 1 {
                RowDecision::Skip
            } else {
                RowDecision::Abort
            }
        }
    }

    let mut policy = SkipThenAbort(0);
    let summary = run_load(&mut source, &mut store, &mapping, &mut policy).expect("load");
    match summary.outcome {
        LoadOutcome::Aborted { row_ordinal, .. } => assert_eq!(row_ordinal, 4),
        LoadOutcome::Completed => panic!("expected abort"),
    }
    assert_eq!(ids(&store), Vec::<i64>::new());
}

#[test]
fn unknown_table_fails_before_any_row() {
    let store = people_store();
    match store.columns("nonexistent") {
        Err(SchemaError::UnknownTable { table }) => assert_eq!(table, "nonexistent"),
        other => panic!("expected UnknownTable, got {other:?}"),
    }
}

#[test]
fn schema_descriptor_reports_ordinals_and_types() {
    let store = people_store();
    let columns = store.columns("people").expect("schema");
    assert_eq!(columns.len(), 3);
    assert_eq!(columns[0].name, "id");
    assert_eq!(columns[0].type_name, "INTEGER");
    assert_eq!(columns[0].ordinal, 1);
    assert_eq!(columns[2].name, "created");
    assert_eq!(columns[2].type_name, "TIMESTAMP");
    assert_eq!(columns[2].ordinal, 3);
}
