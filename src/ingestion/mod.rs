//! Row sources and the ingestion orchestrator.
//!
//! Most callers should use [`ingest_from_path`] (from [`unified`]) which:
//!
//! - auto-detects format by file extension (or you can override via [`IngestionOptions`])
//! - resolves the destination schema (authoritative or inferred by [`inference`])
//! - creates the table, batches the rows and creates the indexes
//! - optionally reports progress, success, failure and alerts to an [`IngestionObserver`]
//!
//! Any other source can be loaded by implementing [`RowSource`] and calling [`ingest`].
//!
//! Connectors:
//! - [`csv`]
//! - [`json`]
//! - [`parquet`]
//! - [`sqlite`]

pub mod csv;
pub mod inference;
pub mod json;
pub mod observability;
pub mod parquet;
pub mod source;
pub mod sqlite;
pub mod unified;

pub use inference::{InferenceOptions, SchemaInferencer, infer_table_definition};
pub use observability::{
    CompositeObserver, FileObserver, IngestionContext, IngestionObserver, IngestionSeverity, IngestionStats,
    StdErrObserver,
};
pub use source::{Record, RecordIter, RowSource, VecSource};
pub use unified::{
    IngestionFormat, IngestionOptions, IngestionReport, IngestionRequest, ingest, ingest_database, ingest_from_path,
};
