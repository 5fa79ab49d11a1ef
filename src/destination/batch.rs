//! Batch insert emitter.
//!
//! Rows are encoded in [`TableDefinition`] column order and buffered; every `batch_size` rows a
//! single multi-row `INSERT` is executed against the destination and the buffer is cleared. The
//! remainder is flushed when the stream ends, so `n` rows produce exactly `ceil(n / batch_size)`
//! statements.
//!
//! There is no atomicity across batches: if a flush fails, earlier batches stay committed and the
//! rest of the stream is not read.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{LoaderError, LoaderResult};
use crate::types::{Record, TableDefinition, Value};

use super::encode::{NULL, ValueEncoder};
use super::{Destination, sql};

/// Default number of rows per INSERT statement.
pub const DEFAULT_BATCH_SIZE: usize = 1_000;

/// Cooperative cancellation flag, checked before every flush.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Batches already flushed are not rolled back.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Totals reported by the emitter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Rows written.
    pub rows: usize,
    /// INSERT statements executed.
    pub batches: usize,
}

/// Streams encoded rows into bounded multi-row INSERT statements.
pub struct BatchInsertEmitter<'a, D: Destination + ?Sized> {
    destination: &'a mut D,
    table: &'a TableDefinition,
    encoder: &'a ValueEncoder,
    batch_size: usize,
    serialize_nested: bool,
    cancellation: Option<CancellationToken>,
    on_flush: Option<Box<dyn FnMut(BatchStats) + 'a>>,
    header: String,
    buffer: Vec<String>,
    stats: BatchStats,
}

impl<D: Destination + ?Sized> fmt::Debug for BatchInsertEmitter<'_, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchInsertEmitter")
            .field("table", &self.table.name)
            .field("batch_size", &self.batch_size)
            .field("buffered", &self.buffer.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl<'a, D: Destination + ?Sized> BatchInsertEmitter<'a, D> {
    /// Create an emitter with [`DEFAULT_BATCH_SIZE`] and nested values serialized.
    pub fn new(destination: &'a mut D, table: &'a TableDefinition, encoder: &'a ValueEncoder) -> Self {
        Self {
            destination,
            table,
            encoder,
            batch_size: DEFAULT_BATCH_SIZE,
            serialize_nested: true,
            cancellation: None,
            on_flush: None,
            header: sql::insert_header(table),
            buffer: Vec::new(),
            stats: BatchStats::default(),
        }
    }

    /// Rows per statement. Zero is treated as one.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// When `false`, nested documents/arrays are written as `NULL`.
    pub fn serialize_nested(mut self, serialize_nested: bool) -> Self {
        self.serialize_nested = serialize_nested;
        self
    }

    pub fn cancellation(mut self, token: Option<CancellationToken>) -> Self {
        self.cancellation = token;
        self
    }

    /// Called after every successful flush with the running totals.
    pub fn on_flush(mut self, f: impl FnMut(BatchStats) + 'a) -> Self {
        self.on_flush = Some(Box::new(f));
        self
    }

    /// Encode one row and buffer it, flushing when the buffer is full.
    pub fn push(&mut self, record: &Record) -> LoaderResult<()> {
        let tuple = self.encode_row(record)?;
        self.buffer.push(tuple);
        if self.buffer.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Flush any remainder and return the totals.
    pub fn finish(mut self) -> LoaderResult<BatchStats> {
        if !self.buffer.is_empty() {
            self.flush()?;
        }
        Ok(self.stats)
    }

    fn encode_row(&self, record: &Record) -> LoaderResult<String> {
        let mut values = Vec::with_capacity(self.table.len());
        for column in self.table.columns() {
            let literal = match record.get(&column.name) {
                None => NULL.to_string(),
                Some(Value::Nested(_)) if !self.serialize_nested => NULL.to_string(),
                Some(value) => self.encoder.encode_column(value, column)?,
            };
            values.push(literal);
        }
        Ok(format!("({})", values.join(",")))
    }

    fn flush(&mut self) -> LoaderResult<()> {
        if self.cancellation.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Err(LoaderError::Cancelled {
                table: self.table.name.clone(),
                batches: self.stats.batches,
            });
        }

        let statement = format!("{}\n{};", self.header, self.buffer.join(",\n"));
        self.destination
            .execute(&statement)
            .map_err(|e| LoaderError::destination(&self.table.name, &statement, e))?;

        self.stats.rows += self.buffer.len();
        self.stats.batches += 1;
        self.buffer.clear();

        let stats = self.stats;
        if let Some(f) = self.on_flush.as_mut() {
            f(stats);
        }
        Ok(())
    }
}

/// Drain `rows` into `destination` in batches of `batch_size`.
///
/// The first error (source, encoding or destination) aborts the stream.
pub fn emit_rows<D, I>(
    destination: &mut D,
    table: &TableDefinition,
    encoder: &ValueEncoder,
    batch_size: usize,
    rows: I,
) -> LoaderResult<BatchStats>
where
    D: Destination + ?Sized,
    I: IntoIterator<Item = LoaderResult<Record>>,
{
    let mut emitter = BatchInsertEmitter::new(destination, table, encoder).batch_size(batch_size);
    for row in rows {
        emitter.push(&row?)?;
    }
    emitter.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::ScriptDestination;
    use crate::types::{Column, Interpretation, SemanticKind, StorageClass};

    fn table() -> TableDefinition {
        TableDefinition::with_columns(
            "t",
            vec![
                Column::new("id", SemanticKind::Int64, true).unwrap(),
                Column::new("name", SemanticKind::String, false).unwrap(),
            ],
        )
    }

    fn rows(n: i64) -> Vec<LoaderResult<Record>> {
        (0..n)
            .map(|i| Ok(Record::new().with("name", format!("n{i}")).with("id", i)))
            .collect()
    }

    fn statements(out: Vec<u8>) -> Vec<String> {
        String::from_utf8(out)
            .unwrap()
            .split(";\n")
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn issues_ceil_n_over_b_statements() {
        for (n, b, expected) in [(0, 3, 0), (1, 3, 1), (3, 3, 1), (4, 3, 2), (10, 3, 4), (10, 1, 10)] {
            let mut dest = ScriptDestination::new(Vec::new());
            let def = table();
            let encoder = ValueEncoder::new();
            let stats = emit_rows(&mut dest, &def, &encoder, b, rows(n)).unwrap();
            assert_eq!(stats.batches, expected, "n={n} b={b}");
            assert_eq!(stats.rows, n as usize);
            assert_eq!(statements(dest.into_inner()).len(), expected);
        }
    }

    #[test]
    fn tuples_follow_column_order_and_missing_is_null() {
        let mut dest = ScriptDestination::new(Vec::new());
        let def = table();
        let encoder = ValueEncoder::new();
        let input = vec![Ok(Record::new().with("name", "O'Brien").with("id", 1_i64)), Ok(Record::new().with("id", 2_i64))];
        emit_rows(&mut dest, &def, &encoder, 10, input).unwrap();

        let out = statements(dest.into_inner());
        assert_eq!(
            out,
            vec!["INSERT INTO \"t\" (\"id\",\"name\") VALUES\n(1,'O''Brien'),\n(2,NULL)".to_string()]
        );
    }

    #[test]
    fn nested_values_are_null_when_not_serialized() {
        let def = TableDefinition::with_columns(
            "t",
            vec![Column::with_storage_class("doc", SemanticKind::Nested, StorageClass::Text, false)
                .with_interpretation(Interpretation::NONE)],
        );
        let encoder = ValueEncoder::new();
        let mut dest = ScriptDestination::new(Vec::new());
        let mut emitter = BatchInsertEmitter::new(&mut dest, &def, &encoder).serialize_nested(false);
        emitter
            .push(&Record::new().with("doc", Value::Nested(serde_json::json!({"a": 1}))))
            .unwrap();
        emitter.finish().unwrap();
        assert!(String::from_utf8(dest.into_inner()).unwrap().contains("(NULL)"));
    }

    #[test]
    fn encoding_failure_aborts_before_flush() {
        let def = TableDefinition::with_columns(
            "t",
            vec![Column::with_storage_class("n", SemanticKind::String, StorageClass::Integer, true)],
        );
        let encoder = ValueEncoder::new();
        let mut dest = ScriptDestination::new(Vec::new());
        let input = vec![Ok(Record::new().with("n", "12")), Ok(Record::new().with("n", "twelve"))];
        let err = emit_rows(&mut dest, &def, &encoder, 1, input).unwrap_err();
        assert!(matches!(err, LoaderError::AmbiguousStringValue { .. }));
        // The first batch was already flushed.
        assert_eq!(statements(dest.into_inner()).len(), 1);
    }

    #[test]
    fn cancellation_is_checked_before_each_flush() {
        let token = CancellationToken::new();
        let def = table();
        let encoder = ValueEncoder::new();
        let mut dest = ScriptDestination::new(Vec::new());
        let flushes = std::cell::Cell::new(0);
        {
            let cancel = token.clone();
            let mut emitter = BatchInsertEmitter::new(&mut dest, &def, &encoder)
                .batch_size(2)
                .cancellation(Some(token.clone()))
                .on_flush(|_| {
                    flushes.set(flushes.get() + 1);
                    cancel.cancel();
                });
            for row in rows(3) {
                match emitter.push(&row.unwrap()) {
                    Ok(()) => {}
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
            let err = emitter.finish().unwrap_err();
            assert!(matches!(err, LoaderError::Cancelled { batches: 1, .. }));
        }
        assert_eq!(flushes.get(), 1);
        assert!(token.is_cancelled());
    }
}
