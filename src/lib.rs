//! `sqlite-loader` loads records from heterogeneous sources into an embedded SQLite database.
//!
//! Every job does the same four things, whatever the source:
//!
//! - decide the destination table schema (the source's own schema, an explicit
//!   [`types::TableDefinition`], or one inferred from a sample of records)
//! - map each column's semantic kind to one of five storage classes
//!   ([`types::StorageClass`])
//! - encode each value as a correctly escaped SQL literal and stream rows into bounded
//!   multi-row `INSERT` batches
//! - derive a deduplicated index set from source metadata, defaults and explicit requests
//!
//! The primary entrypoint is [`ingestion::ingest_from_path`], which picks a connector from the
//! file extension (or you can force a format via [`ingestion::IngestionOptions`]). Any other
//! source can implement [`ingestion::RowSource`] and use [`ingestion::ingest`].
//!
//! ## What you can load
//!
//! - **CSV**: `.csv` (cells are strings; use interpretation flags or an explicit definition for
//!   numbers, dates and binary)
//! - **JSON**: `.json` (array of objects or single object), `.jsonl` / `.ndjson`
//! - **Parquet**: `.parquet`, `.pq` (authoritative schema)
//! - **SQLite**: `.db`, `.sqlite`, `.sqlite3` (authoritative schema and index discovery)
//!
//! ## Quick example
//!
//! ```rust
//! use sqlite_loader::destination::SqliteDestination;
//! use sqlite_loader::ingestion::{ingest, IngestionOptions, VecSource};
//! use sqlite_loader::types::{IndexSpec, Record, Value};
//!
//! # fn main() -> Result<(), sqlite_loader::LoaderError> {
//! let mut source = VecSource::new(vec![
//!     Record::new().with("id", 1_i64).with("email", "ada@example.com"),
//!     Record::new().with("id", 2_i64).with("email", Value::Null),
//! ]);
//! let opts = IngestionOptions {
//!     indexes: vec![IndexSpec::new(["email"])],
//!     ..Default::default()
//! };
//!
//! let mut dest = SqliteDestination::open_in_memory()?;
//! let report = ingest(&mut source, "people", &mut dest, &opts)?;
//! assert_eq!(report.rows, 2);
//! assert_eq!(report.indexes.len(), 1);
//!
//! let n: i64 = dest
//!     .connection()
//!     .query_row("SELECT COUNT(*) FROM people WHERE email IS NULL", [], |r| r.get(0))?;
//! assert_eq!(n, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`ingestion`]: row sources, schema inference, the orchestrator and observers
//! - [`destination`]: storage classes, literal encoding, batching, index sets and sinks
//! - [`types`]: values, columns, table definitions and index specs
//! - [`error`]: the error type shared by every stage

pub mod destination;
pub mod error;
pub mod ingestion;
pub mod types;

pub use error::{LoaderError, LoaderResult};
