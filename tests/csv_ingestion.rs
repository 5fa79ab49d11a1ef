use std::collections::BTreeMap;

use sqlite_loader::destination::SqliteDestination;
use sqlite_loader::ingestion::csv::{CsvOptions, CsvSource};
use sqlite_loader::ingestion::{IngestionOptions, RowSource, ingest, ingest_from_path};
use sqlite_loader::types::{Column, Interpretation, SemanticKind, StorageClass, TableDefinition, Value};
use sqlite_loader::LoaderError;

fn people_definition() -> TableDefinition {
    TableDefinition::with_columns(
        "people",
        vec![
            Column::with_storage_class("id", SemanticKind::String, StorageClass::Integer, true),
            Column::new("name", SemanticKind::String, true).unwrap(),
            Column::with_storage_class("score", SemanticKind::String, StorageClass::Real, true),
            Column::new("active", SemanticKind::String, true).unwrap(),
            Column::with_storage_class("salary", SemanticKind::String, StorageClass::Numeric, false)
                .with_interpretation(Interpretation::STRIP_ALPHA | Interpretation::EMPTY_STRING_IS_NULL),
        ],
    )
}

#[test]
fn csv_fixture_loads_as_text_by_default() {
    let mut dest = SqliteDestination::open_in_memory().unwrap();
    let report = ingest_from_path("tests/fixtures/people.csv", &mut dest, &IngestionOptions::default()).unwrap();
    assert_eq!(report.table, "people");
    assert_eq!(report.rows, 2);
    assert_eq!(report.batches, 1);

    let (name, score): (String, String) = dest
        .connection()
        .query_row("SELECT name, score FROM people WHERE id = '1'", [], |r| {
            Ok((r.get(0)?, r.get(1)?))
        })
        .unwrap();
    assert_eq!(name, "Ada");
    assert_eq!(score, "98.5");

    // The empty salary cell is NULL, so the column is optional.
    let salary_nulls: i64 = dest
        .connection()
        .query_row("SELECT COUNT(*) FROM people WHERE salary IS NULL", [], |r| r.get(0))
        .unwrap();
    assert_eq!(salary_nulls, 1);
}

#[test]
fn csv_with_explicit_definition_writes_numbers() {
    let opts = IngestionOptions {
        table_definition: Some(people_definition()),
        ..Default::default()
    };
    let mut dest = SqliteDestination::open_in_memory().unwrap();
    ingest_from_path("tests/fixtures/people.csv", &mut dest, &opts).unwrap();

    let (id, score, salary): (i64, f64, f64) = dest
        .connection()
        .query_row("SELECT id, score, salary FROM people WHERE name = 'Ada'", [], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?))
        })
        .unwrap();
    assert_eq!(id, 1);
    assert_eq!(score, 98.5);
    assert_eq!(salary, 1200.5);

    let grace_salary: Option<f64> = dest
        .connection()
        .query_row("SELECT salary FROM people WHERE id = 2", [], |r| r.get(0))
        .unwrap();
    assert_eq!(grace_salary, None);
}

#[test]
fn csv_storage_class_overrides_and_interpretations_apply_to_inferred_columns() {
    let mut interpretations = BTreeMap::new();
    interpretations.insert(
        "salary".to_string(),
        Interpretation::STRIP_ALPHA | Interpretation::EMPTY_STRING_IS_NULL,
    );
    interpretations.insert("not_a_column".to_string(), Interpretation::HEX);
    let mut storage_classes = BTreeMap::new();
    storage_classes.insert("id".to_string(), StorageClass::Integer);
    storage_classes.insert("salary".to_string(), StorageClass::Real);

    let opts = IngestionOptions {
        interpretations,
        storage_classes,
        ..Default::default()
    };
    let mut dest = SqliteDestination::open_in_memory().unwrap();
    ingest_from_path("tests/fixtures/people.csv", &mut dest, &opts).unwrap();

    let total: f64 = dest
        .connection()
        .query_row("SELECT SUM(salary) FROM people", [], |r| r.get(0))
        .unwrap();
    assert_eq!(total, 1200.5);

    let id_type: String = dest
        .connection()
        .query_row("SELECT typeof(id) FROM people WHERE name = 'Grace'", [], |r| r.get(0))
        .unwrap();
    assert_eq!(id_type, "integer");
}

#[test]
fn non_numeric_text_in_numeric_column_is_rejected() {
    let data = "id,amount\n1,12\n2,twelve\n";
    let def = TableDefinition::with_columns(
        "amounts",
        vec![
            Column::with_storage_class("id", SemanticKind::String, StorageClass::Integer, true),
            Column::with_storage_class("amount", SemanticKind::String, StorageClass::Integer, true),
        ],
    );
    let opts = IngestionOptions {
        table_definition: Some(def),
        ..Default::default()
    };
    let mut source = CsvSource::from_reader(data.as_bytes(), &CsvOptions::default()).unwrap();
    let mut dest = SqliteDestination::open_in_memory().unwrap();

    let err = ingest(&mut source, "amounts", &mut dest, &opts).unwrap_err();
    match err {
        LoaderError::AmbiguousStringValue { column, raw, .. } => {
            assert_eq!(column, "amount");
            assert_eq!(raw, "twelve");
        }
        other => panic!("expected AmbiguousStringValue, got {other:?}"),
    }
}

#[test]
fn quotes_in_cells_survive_the_round_trip() {
    let data = "id,name\n1,\"O'Brien\"\n2,'quoted'\n";
    let mut source = CsvSource::from_reader(data.as_bytes(), &CsvOptions::default()).unwrap();
    let mut dest = SqliteDestination::open_in_memory().unwrap();
    ingest(&mut source, "names", &mut dest, &IngestionOptions::default()).unwrap();

    let mut stmt = dest.connection().prepare("SELECT name FROM names ORDER BY id").unwrap();
    let names: Vec<String> = stmt
        .query_map([], |r| r.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(names, vec!["O'Brien".to_string(), "'quoted'".to_string()]);
}

#[test]
fn header_only_csv_is_skipped() {
    let mut dest = SqliteDestination::open_in_memory().unwrap();
    let report =
        ingest_from_path("tests/fixtures/headers_only.csv", &mut dest, &IngestionOptions::default()).unwrap();
    assert!(report.skipped);
    assert_eq!(report.rows, 0);

    let tables: i64 = dest
        .connection()
        .query_row("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'", [], |r| r.get(0))
        .unwrap();
    assert_eq!(tables, 0);
}

#[test]
fn csv_source_yields_string_cells() {
    let mut source = CsvSource::from_path("tests/fixtures/people.csv", &CsvOptions::default()).unwrap();
    assert_eq!(source.headers(), ["id", "name", "score", "active", "salary"]);
    let records: Vec<_> = source.records().unwrap().collect::<Result<_, _>>().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].get("salary"), Some(&Value::String("$1,200.50".to_string())));
    assert_eq!(records[1].get("salary"), Some(&Value::Null));
}
