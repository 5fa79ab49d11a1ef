//! Schema inference for sources without an authoritative schema.
//!
//! The inferencer looks at a bounded prefix of the record stream. Each field's kind is pinned by
//! its first non-null observation; later values never refine it, and fields that first appear
//! after the sample are not discovered.

use serde::{Deserialize, Serialize};

use crate::error::{LoaderError, LoaderResult};
use crate::types::{Column, Record, SemanticKind, TableDefinition, Value};

/// Default number of records sampled by inference.
pub const DEFAULT_SAMPLE_SIZE: usize = 500;

/// Options controlling schema inference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceOptions {
    /// Maximum number of records inspected.
    pub sample_size: usize,
    /// When `true`, nested documents/arrays become text columns; otherwise they are dropped.
    pub serialize_nested: bool,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self {
            sample_size: DEFAULT_SAMPLE_SIZE,
            serialize_nested: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldState {
    /// Only nulls so far.
    Pending,
    Resolved(SemanticKind),
    /// Nested field with nested serialization disabled.
    Dropped,
}

#[derive(Debug, Clone)]
struct FieldStats {
    name: String,
    state: FieldState,
    occurrences: usize,
    null_seen: bool,
}

/// Incremental schema inferencer.
///
/// Feed records with [`SchemaInferencer::observe`] until [`SchemaInferencer::is_full`], then call
/// [`SchemaInferencer::finish`].
#[derive(Debug, Clone)]
pub struct SchemaInferencer {
    options: InferenceOptions,
    fields: Vec<FieldStats>,
    sampled: usize,
}

impl SchemaInferencer {
    pub fn new(options: InferenceOptions) -> Self {
        Self {
            options,
            fields: Vec::new(),
            sampled: 0,
        }
    }

    /// Number of records observed so far.
    pub fn sampled(&self) -> usize {
        self.sampled
    }

    /// Returns `true` once the sample cap has been reached.
    pub fn is_full(&self) -> bool {
        self.sampled >= self.options.sample_size
    }

    /// Record one observation. Returns `false` (and ignores the record) when the sample is full.
    pub fn observe(&mut self, record: &Record) -> bool {
        if self.is_full() {
            return false;
        }
        self.sampled += 1;

        for (name, value) in record.fields() {
            let idx = match self.fields.iter().position(|f| f.name == name) {
                Some(idx) => idx,
                None => {
                    // A field first seen after record 1 was absent from every earlier record.
                    self.fields.push(FieldStats {
                        name: name.to_string(),
                        state: FieldState::Pending,
                        occurrences: 0,
                        null_seen: false,
                    });
                    self.fields.len() - 1
                }
            };

            let field = &mut self.fields[idx];
            field.occurrences += 1;
            if value.is_null() {
                field.null_seen = true;
                continue;
            }
            if field.state == FieldState::Pending {
                field.state = match value {
                    Value::Nested(_) if !self.options.serialize_nested => FieldState::Dropped,
                    v => FieldState::Resolved(v.kind()),
                };
            }
        }
        true
    }

    /// Build the table definition.
    ///
    /// Fails with [`LoaderError::EmptySchema`] when no columns were discovered and with
    /// [`LoaderError::UnsupportedSourceType`] when a field resolved to a kind with no storage class.
    pub fn finish(self, table: &str) -> LoaderResult<TableDefinition> {
        let sampled = self.sampled;
        let mut def = TableDefinition::new(table);
        for field in self.fields {
            let required = field.occurrences == sampled && !field.null_seen;
            let column = match field.state {
                FieldState::Dropped => continue,
                FieldState::Pending => Column::new(field.name, SemanticKind::Null, false)?,
                FieldState::Resolved(kind) => Column::new(field.name, kind, required)?,
            };
            def.push(column);
        }

        if def.is_empty() {
            return Err(LoaderError::EmptySchema {
                table: table.to_string(),
            });
        }
        Ok(def)
    }
}

/// Sample up to `options.sample_size` records from `records` and infer a definition.
///
/// The sampled records are returned so the caller can replay them ahead of the rest of the
/// stream; the iterator is left positioned after the sample.
pub fn sample_and_infer<I>(
    table: &str,
    records: &mut I,
    options: &InferenceOptions,
) -> LoaderResult<(TableDefinition, Vec<Record>)>
where
    I: Iterator<Item = LoaderResult<Record>> + ?Sized,
{
    let mut inferencer = SchemaInferencer::new(options.clone());
    let mut sample = Vec::with_capacity(options.sample_size.min(1024));
    while !inferencer.is_full() {
        match records.next() {
            Some(record) => {
                let record = record?;
                inferencer.observe(&record);
                sample.push(record);
            }
            None => break,
        }
    }
    let def = inferencer.finish(table)?;
    Ok((def, sample))
}

/// Infer a definition from the first `options.sample_size` records.
pub fn infer_table_definition<I>(
    table: &str,
    records: I,
    options: &InferenceOptions,
) -> LoaderResult<TableDefinition>
where
    I: IntoIterator<Item = LoaderResult<Record>>,
{
    let mut iter = records.into_iter();
    sample_and_infer(table, &mut iter, options).map(|(def, _)| def)
}
