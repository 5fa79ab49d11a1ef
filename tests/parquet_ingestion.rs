use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parquet::column::writer::ColumnWriter;
use parquet::data_type::ByteArray;
use parquet::file::properties::WriterProperties;
use parquet::file::writer::SerializedFileWriter;
use parquet::schema::parser::parse_message_type;

use sqlite_loader::destination::SqliteDestination;
use sqlite_loader::ingestion::parquet::ParquetSource;
use sqlite_loader::ingestion::{IngestionOptions, RowSource, ingest, ingest_from_path};
use sqlite_loader::types::{SemanticKind, StorageClass, Value};

fn tmp_parquet(stem: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("sqlite-loader-parquet-{nanos}"));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(format!("{stem}.parquet"))
}

/// Two rows: (1, "Ada", 98.5, true, "ADA") and (2, "Grace", NULL, false, NULL).
fn write_people_parquet(path: &PathBuf) {
    let schema_str = r#"
    message schema {
      REQUIRED INT64 id;
      REQUIRED BINARY name (UTF8);
      OPTIONAL DOUBLE score;
      REQUIRED BOOLEAN active;
      OPTIONAL BINARY badge;
    }
    "#;

    let schema = Arc::new(parse_message_type(schema_str).unwrap());
    let props = Arc::new(WriterProperties::builder().build());
    let file = File::create(path).unwrap();
    let mut writer = SerializedFileWriter::new(file, schema, props).unwrap();

    let mut rg = writer.next_row_group().unwrap();
    let mut col_idx: usize = 0;
    while let Some(mut col) = rg.next_column().unwrap() {
        match col.untyped() {
            ColumnWriter::Int64ColumnWriter(w) => {
                w.write_batch(&[1_i64, 2_i64], None, None).unwrap();
            }
            ColumnWriter::ByteArrayColumnWriter(w) if col_idx == 1 => {
                let v1 = ByteArray::from("Ada");
                let v2 = ByteArray::from("Grace");
                w.write_batch(&[v1, v2], None, None).unwrap();
            }
            ColumnWriter::ByteArrayColumnWriter(w) => {
                assert_eq!(col_idx, 4);
                w.write_batch(&[ByteArray::from(vec![0x41_u8, 0x44, 0x41])], Some(&[1, 0]), None)
                    .unwrap();
            }
            ColumnWriter::DoubleColumnWriter(w) => {
                w.write_batch(&[98.5_f64], Some(&[1, 0]), None).unwrap();
            }
            ColumnWriter::BoolColumnWriter(w) => {
                w.write_batch(&[true, false], None, None).unwrap();
            }
            _ => panic!("unexpected column writer in test"),
        }
        col.close().unwrap();
        col_idx += 1;
    }
    rg.close().unwrap();
    writer.close().unwrap();
}

#[test]
fn parquet_schema_is_authoritative() {
    let path = tmp_parquet("people");
    write_people_parquet(&path);

    let source = ParquetSource::from_path(&path).unwrap();
    let def = source.table_definition().unwrap().unwrap();
    let summary: Vec<_> = def
        .columns()
        .iter()
        .map(|c| (c.name.as_str(), c.kind, c.storage_class, c.required))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("id", SemanticKind::Int64, StorageClass::Integer, true),
            ("name", SemanticKind::String, StorageClass::Text, true),
            ("score", SemanticKind::Float64, StorageClass::Real, false),
            ("active", SemanticKind::Boolean, StorageClass::Integer, true),
            ("badge", SemanticKind::Bytes, StorageClass::Blob, false),
        ]
    );

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn parquet_rows_become_records() {
    let path = tmp_parquet("people");
    write_people_parquet(&path);

    let mut source = ParquetSource::from_path(&path).unwrap();
    let records: Vec<_> = source.records().unwrap().collect::<Result<_, _>>().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].get("name"), Some(&Value::String("Ada".to_string())));
    assert_eq!(records[0].get("badge"), Some(&Value::Bytes(b"ADA".to_vec())));
    assert_eq!(records[1].get("score"), Some(&Value::Null));

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn parquet_file_loads_end_to_end() {
    let path = tmp_parquet("people");
    write_people_parquet(&path);

    let mut dest = SqliteDestination::open_in_memory().unwrap();
    let report = ingest_from_path(&path, &mut dest, &IngestionOptions::default()).unwrap();
    assert_eq!(report.table, "people");
    assert_eq!(report.rows, 2);

    let (active, badge): (i64, Vec<u8>) = dest
        .connection()
        .query_row("SELECT active, badge FROM people WHERE id = 1", [], |r| {
            Ok((r.get(0)?, r.get(1)?))
        })
        .unwrap();
    assert_eq!(active, 1);
    assert_eq!(badge, b"ADA".to_vec());

    let score: Option<f64> = dest
        .connection()
        .query_row("SELECT score FROM people WHERE name = 'Grace'", [], |r| r.get(0))
        .unwrap();
    assert_eq!(score, None);

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn parquet_rows_respect_output_table_and_batch_size() {
    let path = tmp_parquet("people");
    write_people_parquet(&path);

    let opts = IngestionOptions {
        output_table: Some("staff".to_string()),
        batch_size: 1,
        ..Default::default()
    };
    let mut source = ParquetSource::from_path(&path).unwrap();
    let mut dest = SqliteDestination::open_in_memory().unwrap();
    let report = ingest(&mut source, "people", &mut dest, &opts).unwrap();
    assert_eq!(report.table, "staff");
    assert_eq!(report.batches, 2);

    let n: i64 = dest
        .connection()
        .query_row("SELECT COUNT(*) FROM staff", [], |r| r.get(0))
        .unwrap();
    assert_eq!(n, 2);

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}
