use thiserror::Error;

use crate::types::{SemanticKind, StorageClass};

/// Convenience result type for loader operations.
pub type LoaderResult<T> = Result<T, LoaderError>;

/// Boxed error returned by a [`crate::destination::Destination`] when it rejects a statement.
pub type DestinationError = Box<dyn std::error::Error + Send + Sync>;

/// Longest statement excerpt kept in [`LoaderError::DestinationExecutionFailure`].
const STATEMENT_EXCERPT_LEN: usize = 512;

/// Error type returned by schema resolution, encoding, batching and connectors.
///
/// A single enum is shared by every source so callers can match on the failure kind without
/// caring which connector produced it.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// A source value kind has no storage class.
    #[error("unsupported source type {kind} for column '{column}'")]
    UnsupportedSourceType { column: String, kind: String },

    /// The (kind, storage class) pair has no literal form.
    #[error("cannot convert {kind} to {class} for column '{column}'")]
    TypeConversionUnsupported {
        column: String,
        kind: SemanticKind,
        class: StorageClass,
    },

    /// A string could not be interpreted for its target storage class.
    #[error("ambiguous string value for column '{column}': {message} (raw='{raw}')")]
    AmbiguousStringValue {
        column: String,
        raw: String,
        message: String,
    },

    /// Schema inference found no columns. The orchestrator treats this as a skip.
    #[error("no columns discovered for table '{table}'")]
    EmptySchema { table: String },

    /// The destination rejected a DDL or DML statement.
    #[error("destination rejected statement for table '{table}': {source} (statement='{statement}')")]
    DestinationExecutionFailure {
        table: String,
        statement: String,
        #[source]
        source: DestinationError,
    },

    /// The job was cancelled between batches.
    #[error("ingestion of table '{table}' cancelled after {batches} batch(es)")]
    Cancelled { table: String, batches: usize },

    /// The input does not have the expected shape (not an object, unknown table, etc.).
    #[error("schema mismatch: {message}")]
    SchemaMismatch { message: String },

    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV source error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON or NDJSON text that does not parse. `line` is 1-based; whole-document input reports 1.
    #[error("invalid json at line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// Parquet source error.
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// SQLite error outside statement execution (opening a connection, reading a source).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl LoaderError {
    /// Build a [`LoaderError::DestinationExecutionFailure`], keeping only the head of long
    /// statements so multi-megabyte INSERT batches do not end up in logs verbatim.
    pub fn destination(table: &str, statement: &str, source: DestinationError) -> Self {
        LoaderError::DestinationExecutionFailure {
            table: table.to_string(),
            statement: excerpt(statement),
            source,
        }
    }
}

fn excerpt(statement: &str) -> String {
    if statement.len() <= STATEMENT_EXCERPT_LEN {
        return statement.to_string();
    }
    let mut end = STATEMENT_EXCERPT_LEN;
    while !statement.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &statement[..end])
}
