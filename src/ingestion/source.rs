//! The row source interface implemented by every connector.

use crate::error::LoaderResult;
use crate::types::{IndexCandidate, IndexSpec, TableDefinition};

pub use crate::types::Record;

/// A lazy, single-pass stream of records.
pub type RecordIter<'a> = Box<dyn Iterator<Item = LoaderResult<Record>> + 'a>;

/// A source of records for one ingestion job.
///
/// Only [`RowSource::records`] is required. Sources with a reliable native schema return it from
/// [`RowSource::table_definition`], which bypasses inference; sources with index metadata return
/// it from [`RowSource::index_candidates`].
pub trait RowSource {
    /// Human-readable label used in logs (e.g. `csv:data/people.csv`).
    fn describe(&self) -> String;

    /// Authoritative table definition, if the source has one.
    fn table_definition(&self) -> LoaderResult<Option<TableDefinition>> {
        Ok(None)
    }

    /// Index candidates harvested from source metadata.
    fn index_candidates(&self) -> LoaderResult<Vec<IndexCandidate>> {
        Ok(Vec::new())
    }

    /// Column sequences that are always indexed for this source.
    fn default_indexes(&self) -> Vec<IndexSpec> {
        Vec::new()
    }

    /// Start reading records. Sources are read once; a second call may fail.
    fn records(&mut self) -> LoaderResult<RecordIter<'_>>;
}

/// In-memory records, optionally with a fixed schema and default indexes.
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    label: String,
    records: Vec<Record>,
    definition: Option<TableDefinition>,
    candidates: Vec<IndexCandidate>,
    defaults: Vec<IndexSpec>,
}

impl VecSource {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            label: "memory".to_string(),
            records,
            ..Self::default()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Use `definition` instead of inferring one.
    pub fn with_definition(mut self, definition: TableDefinition) -> Self {
        self.definition = Some(definition);
        self
    }

    pub fn with_index_candidates(mut self, candidates: Vec<IndexCandidate>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn with_default_indexes(mut self, defaults: Vec<IndexSpec>) -> Self {
        self.defaults = defaults;
        self
    }
}

impl RowSource for VecSource {
    fn describe(&self) -> String {
        format!("{}:{} record(s)", self.label, self.records.len())
    }

    fn table_definition(&self) -> LoaderResult<Option<TableDefinition>> {
        Ok(self.definition.clone())
    }

    fn index_candidates(&self) -> LoaderResult<Vec<IndexCandidate>> {
        Ok(self.candidates.clone())
    }

    fn default_indexes(&self) -> Vec<IndexSpec> {
        self.defaults.clone()
    }

    fn records(&mut self) -> LoaderResult<RecordIter<'_>> {
        let records = std::mem::take(&mut self.records);
        Ok(Box::new(records.into_iter().map(Ok)))
    }
}
