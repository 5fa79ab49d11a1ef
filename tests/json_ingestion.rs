use sqlite_loader::destination::SqliteDestination;
use sqlite_loader::ingestion::json::JsonSource;
use sqlite_loader::ingestion::{InferenceOptions, IngestionOptions, RowSource, ingest, ingest_from_path};
use sqlite_loader::types::Value;

fn column_names(dest: &SqliteDestination<'_>, table: &str) -> Vec<String> {
    let mut stmt = dest
        .connection()
        .prepare(&format!("SELECT name FROM pragma_table_info('{table}') ORDER BY cid"))
        .unwrap();
    let names = stmt
        .query_map([], |r| r.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    names
}

#[test]
fn json_array_fixture_keeps_nested_values_as_json_text() {
    let mut dest = SqliteDestination::open_in_memory().unwrap();
    let report = ingest_from_path("tests/fixtures/people.json", &mut dest, &IngestionOptions::default()).unwrap();
    assert_eq!(report.rows, 2);

    assert_eq!(column_names(&dest, "people"), vec!["id", "user", "score", "active", "tags"]);

    let (user, tags, active): (String, String, i64) = dest
        .connection()
        .query_row("SELECT user, tags, active FROM people WHERE id = 1", [], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?))
        })
        .unwrap();
    assert_eq!(user, r#"{"name":"Ada"}"#);
    assert_eq!(tags, r#"["math","engines"]"#);
    assert_eq!(active, 1);

    let name: String = dest
        .connection()
        .query_row("SELECT json_extract(user, '$.name') FROM people WHERE id = 2", [], |r| r.get(0))
        .unwrap();
    assert_eq!(name, "Grace");
}

#[test]
fn nested_fields_are_dropped_when_serialization_is_off() {
    let opts = IngestionOptions {
        inference: InferenceOptions {
            serialize_nested: false,
            ..Default::default()
        },
        ..Default::default()
    };
    let mut dest = SqliteDestination::open_in_memory().unwrap();
    ingest_from_path("tests/fixtures/people.json", &mut dest, &opts).unwrap();

    assert_eq!(column_names(&dest, "people"), vec!["id", "score", "active"]);
    let score: f64 = dest
        .connection()
        .query_row("SELECT score FROM people WHERE id = 2", [], |r| r.get(0))
        .unwrap();
    assert_eq!(score, 87.25);
}

#[test]
fn ndjson_fixture_streams_and_marks_sparse_fields_optional() {
    let opts = IngestionOptions {
        output_table: Some("event_log".to_string()),
        batch_size: 2,
        ..Default::default()
    };
    let mut dest = SqliteDestination::open_in_memory().unwrap();
    let report = ingest_from_path("tests/fixtures/events.ndjson", &mut dest, &opts).unwrap();
    assert_eq!(report.table, "event_log");
    assert_eq!(report.rows, 3);
    assert_eq!(report.batches, 2);

    let notnull: Vec<(String, i64)> = {
        let mut stmt = dest
            .connection()
            .prepare("SELECT name, \"notnull\" FROM pragma_table_info('event_log') ORDER BY cid")
            .unwrap();
        let rows = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        rows
    };
    assert_eq!(
        notnull,
        vec![
            ("event_id".to_string(), 1),
            ("kind".to_string(), 1),
            ("at".to_string(), 1),
            ("note".to_string(), 0),
        ]
    );

    let note: String = dest
        .connection()
        .query_row("SELECT note FROM event_log WHERE event_id = 3", [], |r| r.get(0))
        .unwrap();
    assert_eq!(note, "O'Brien's laptop");
}

#[test]
fn first_non_null_value_decides_the_column_kind() {
    let mut source = JsonSource::parse(r#"[{"v":null},{"v":1},{"v":2.5}]"#).unwrap();
    let mut dest = SqliteDestination::open_in_memory().unwrap();
    ingest(&mut source, "rounding", &mut dest, &IngestionOptions::default()).unwrap();

    let decl: String = dest
        .connection()
        .query_row("SELECT type FROM pragma_table_info('rounding') WHERE name = 'v'", [], |r| r.get(0))
        .unwrap();
    assert_eq!(decl, "INTEGER");

    // 2.5 is rounded half away from zero.
    let total: i64 = dest
        .connection()
        .query_row("SELECT SUM(v) FROM rounding", [], |r| r.get(0))
        .unwrap();
    assert_eq!(total, 4);
}

#[test]
fn json_source_reads_a_single_object() {
    let mut source = JsonSource::parse(r#"{"id":7,"name":"solo"}"#).unwrap();
    let records: Vec<_> = source.records().unwrap().collect::<Result<_, _>>().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].get("id"), Some(&Value::Int64(7)));
}
