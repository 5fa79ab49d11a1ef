//! Ingestion orchestrator.
//!
//! [`ingest`] runs one job against any [`RowSource`]:
//!
//! 1. resolve the table definition (explicit, authoritative, or inferred from a sample)
//! 2. `CREATE TABLE IF NOT EXISTS`
//! 3. stream, encode and batch rows into multi-row `INSERT` statements
//! 4. derive the index set and `CREATE INDEX IF NOT EXISTS` each entry
//!
//! [`ingest_from_path`] picks a connector from the file extension (or
//! [`IngestionOptions::format`]) and then calls [`ingest`]. [`ingest_database`] copies every
//! table (or a listed subset) of a SQLite database, one job per table.
//!
//! If an [`IngestionObserver`] is provided, table creation, batches, skips, success, failures
//! and alerts are reported to it.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::Connection;

use crate::destination::{
    BatchInsertEmitter, CancellationToken, DEFAULT_BATCH_SIZE, Destination, SqliteDestination, ValueEncoder,
    build_index_set, create_indexes, create_table,
};
use crate::error::{LoaderError, LoaderResult};
use crate::types::{IndexSpec, Interpretation, LocaleSettings, StorageClass, TableDefinition};

use super::csv::{CsvOptions, CsvSource};
use super::inference::{InferenceOptions, sample_and_infer};
use super::json::JsonSource;
use super::observability::{IngestionContext, IngestionObserver, IngestionSeverity, IngestionStats};
use super::parquet::ParquetSource;
use super::source::RowSource;
use super::sqlite::SqliteSource;

/// Supported file formats for [`ingest_from_path`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestionFormat {
    /// Comma-separated values.
    Csv,
    /// JSON array-of-objects, single object or NDJSON.
    Json,
    /// Apache Parquet.
    Parquet,
    /// A table in another SQLite database.
    Sqlite,
}

impl IngestionFormat {
    /// Parse an ingestion format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "json" | "jsonl" | "ndjson" => Some(Self::Json),
            "parquet" | "pq" => Some(Self::Parquet),
            "db" | "sqlite" | "sqlite3" => Some(Self::Sqlite),
            _ => None,
        }
    }
}

/// Options controlling an ingestion job.
///
/// Use [`Default`] for common cases.
#[derive(Clone)]
pub struct IngestionOptions {
    /// If `None`, [`ingest_from_path`] detects the format from the file extension.
    pub format: Option<IngestionFormat>,
    /// Destination table name. Defaults to the job's table name (the file stem for paths, the
    /// source table for SQLite databases).
    pub output_table: Option<String>,
    /// Table to read when the source is a SQLite database with more than one table.
    pub source_table: Option<String>,
    /// Explicit columns, bypassing both the source schema and inference.
    pub table_definition: Option<TableDefinition>,
    /// Per-column interpretation flags, applied after the definition is resolved. Names that are
    /// not columns are ignored.
    pub interpretations: BTreeMap<String, Interpretation>,
    /// Per-column storage class overrides (e.g. CSV text written as `REAL`). Names that are not
    /// columns are ignored.
    pub storage_classes: BTreeMap<String, StorageClass>,
    /// Inference sample size and nested-value handling.
    pub inference: InferenceOptions,
    /// Rows per INSERT statement. Zero is treated as one.
    pub batch_size: usize,
    /// Column sequences to index in addition to the source's defaults.
    pub indexes: Vec<IndexSpec>,
    /// Also index what the source's own keys and indexes cover.
    pub auto_indexes: bool,
    /// Decimal separator and date formats for `STRIP_ALPHA` / `LOCAL_DATE`.
    pub locale: LocaleSettings,
    /// CSV parsing options.
    pub csv: CsvOptions,
    /// Checked before every batch and before index creation.
    pub cancellation: Option<CancellationToken>,
    /// Optional observer for logging/alerts.
    pub observer: Option<Arc<dyn IngestionObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: IngestionSeverity,
}

impl fmt::Debug for IngestionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestionOptions")
            .field("format", &self.format)
            .field("output_table", &self.output_table)
            .field("source_table", &self.source_table)
            .field("table_definition_set", &self.table_definition.is_some())
            .field("interpretations", &self.interpretations)
            .field("storage_classes", &self.storage_classes)
            .field("inference", &self.inference)
            .field("batch_size", &self.batch_size)
            .field("indexes", &self.indexes)
            .field("auto_indexes", &self.auto_indexes)
            .field("locale", &self.locale)
            .field("csv", &self.csv)
            .field("cancellation_set", &self.cancellation.is_some())
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            format: None,
            output_table: None,
            source_table: None,
            table_definition: None,
            interpretations: BTreeMap::new(),
            storage_classes: BTreeMap::new(),
            inference: InferenceOptions::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            indexes: Vec::new(),
            auto_indexes: true,
            locale: LocaleSettings::default(),
            csv: CsvOptions::default(),
            cancellation: None,
            observer: None,
            alert_at_or_above: IngestionSeverity::Critical,
        }
    }
}

/// Outcome of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionReport {
    /// Destination table name.
    pub table: String,
    /// Rows written.
    pub rows: usize,
    /// INSERT statements executed.
    pub batches: usize,
    /// Indexes created.
    pub indexes: Vec<IndexSpec>,
    /// `true` when no columns were discovered and nothing was written.
    pub skipped: bool,
}

impl IngestionReport {
    fn skipped(table: &str) -> Self {
        Self {
            table: table.to_string(),
            rows: 0,
            batches: 0,
            indexes: Vec::new(),
            skipped: true,
        }
    }
}

/// Run one ingestion job from `source` into `destination`.
///
/// `table` names the job; the destination table is `options.output_table` when set. A source
/// whose schema has no columns is reported as skipped (`IngestionReport::skipped`), not as an
/// error. Any other failure aborts the job; batches already written stay committed.
///
/// # Examples
///
/// ```rust
/// use sqlite_loader::destination::SqliteDestination;
/// use sqlite_loader::ingestion::{ingest, IngestionOptions, VecSource};
/// use sqlite_loader::types::Record;
///
/// # fn main() -> Result<(), sqlite_loader::LoaderError> {
/// let mut source = VecSource::new(vec![
///     Record::new().with("id", 1_i64).with("name", "Ada"),
///     Record::new().with("id", 2_i64).with("name", "Grace"),
/// ]);
/// let mut dest = SqliteDestination::open_in_memory()?;
///
/// let report = ingest(&mut source, "people", &mut dest, &IngestionOptions::default())?;
/// assert_eq!(report.rows, 2);
/// assert_eq!(report.batches, 1);
/// # Ok(())
/// # }
/// ```
pub fn ingest<S, D>(
    source: &mut S,
    table: &str,
    destination: &mut D,
    options: &IngestionOptions,
) -> LoaderResult<IngestionReport>
where
    S: RowSource + ?Sized,
    D: Destination + ?Sized,
{
    let ctx = IngestionContext {
        table: options.output_table.clone().unwrap_or_else(|| table.to_string()),
        source: source.describe(),
        format: options.format,
    };
    let result = run(source, destination, options, &ctx);
    report(&ctx, options, &result);
    result
}

/// Ingest a file into `destination`, choosing the connector from the file extension.
///
/// - If `options.format` is `None`, the format is inferred from the extension.
/// - SQLite sources read `options.source_table`, or the database's only table. Use
///   [`ingest_database`] to copy several tables.
/// - The job's table name is the source table for SQLite and the file stem otherwise, unless
///   `options.output_table` is set.
///
/// Failures to open the source are reported to the observer like any other failure.
///
/// # Examples
///
/// ## CSV (auto-detect by extension)
///
/// ```no_run
/// use sqlite_loader::destination::SqliteDestination;
/// use sqlite_loader::ingestion::{ingest_from_path, IngestionOptions};
///
/// # fn main() -> Result<(), sqlite_loader::LoaderError> {
/// let mut dest = SqliteDestination::open("warehouse.db")?;
/// // Creates and fills table `people`.
/// let report = ingest_from_path("people.csv", &mut dest, &IngestionOptions::default())?;
/// println!("rows={}", report.rows);
/// # Ok(())
/// # }
/// ```
///
/// ## Interpretation flags and explicit indexes
///
/// ```no_run
/// use sqlite_loader::destination::SqliteDestination;
/// use sqlite_loader::ingestion::{ingest_from_path, IngestionOptions};
/// use sqlite_loader::types::{IndexSpec, Interpretation};
///
/// # fn main() -> Result<(), sqlite_loader::LoaderError> {
/// let mut opts = IngestionOptions {
///     output_table: Some("staff".to_string()),
///     indexes: vec![IndexSpec::new(["last_name", "gender"])],
///     ..Default::default()
/// };
/// opts.interpretations
///     .insert("salary".to_string(), Interpretation::STRIP_ALPHA | Interpretation::EMPTY_STRING_IS_NULL);
///
/// let mut dest = SqliteDestination::open("warehouse.db")?;
/// ingest_from_path("people.json", &mut dest, &opts)?;
/// # Ok(())
/// # }
/// ```
///
/// ## Observability (stderr logging + alert threshold)
///
/// ```no_run
/// use std::sync::Arc;
///
/// use sqlite_loader::destination::SqliteDestination;
/// use sqlite_loader::ingestion::{
///     ingest_from_path, IngestionOptions, IngestionSeverity, StdErrObserver,
/// };
///
/// # fn main() -> Result<(), sqlite_loader::LoaderError> {
/// let opts = IngestionOptions {
///     observer: Some(Arc::new(StdErrObserver::default())),
///     alert_at_or_above: IngestionSeverity::Critical,
///     ..Default::default()
/// };
///
/// let mut dest = SqliteDestination::open_in_memory()?;
/// // Missing files are treated as Critical and will trigger `on_alert` at this threshold.
/// let _err = ingest_from_path("does_not_exist.csv", &mut dest, &opts).unwrap_err();
/// # Ok(())
/// # }
/// ```
pub fn ingest_from_path<D>(
    path: impl AsRef<Path>,
    destination: &mut D,
    options: &IngestionOptions,
) -> LoaderResult<IngestionReport>
where
    D: Destination + ?Sized,
{
    let path = path.as_ref();

    let opened = options
        .format
        .map_or_else(|| infer_format_from_path(path), Ok)
        .and_then(|fmt| open_source(path, fmt, options).map(|(source, table)| (fmt, source, table)));

    match opened {
        Ok((fmt, mut source, table)) => {
            let options = IngestionOptions {
                format: Some(fmt),
                ..options.clone()
            };
            let table = table.unwrap_or_else(|| file_stem(path));
            ingest(source.as_mut(), &table, destination, &options)
        }
        Err(e) => open_failed(path, file_stem(path), options, e),
    }
}

/// Copy tables of the SQLite database at `path` into `destination`, one job per table.
///
/// `tables` lists the tables to copy, in order; `None` copies every user table in name order.
/// Each table keeps its own name, and its keys and indexes are recreated when
/// `options.auto_indexes` is set. `options.output_table`, `source_table`, `table_definition` and
/// `indexes` describe a single table and are ignored here.
///
/// The first failing table stops the copy. Tables copied before it stay committed.
///
/// # Examples
///
/// ```no_run
/// use sqlite_loader::destination::SqliteDestination;
/// use sqlite_loader::ingestion::{ingest_database, IngestionOptions};
///
/// # fn main() -> Result<(), sqlite_loader::LoaderError> {
/// let mut dest = SqliteDestination::open("warehouse.db")?;
/// let reports = ingest_database("shop.db", Some(&["customers", "orders"][..]), &mut dest, &IngestionOptions::default())?;
/// for report in &reports {
///     println!("{}: rows={}", report.table, report.rows);
/// }
/// # Ok(())
/// # }
/// ```
pub fn ingest_database<D>(
    path: impl AsRef<Path>,
    tables: Option<&[&str]>,
    destination: &mut D,
    options: &IngestionOptions,
) -> LoaderResult<Vec<IngestionReport>>
where
    D: Destination + ?Sized,
{
    let path = path.as_ref();
    let names = match tables {
        Some(names) => names.iter().map(|n| n.to_string()).collect(),
        None => match open_database(path).and_then(|conn| SqliteSource::table_names(&conn)) {
            Ok(names) => names,
            Err(e) => return open_failed(path, file_stem(path), options, e).map(|r| vec![r]),
        },
    };

    let mut reports = Vec::with_capacity(names.len());
    for name in names {
        let options = IngestionOptions {
            format: Some(IngestionFormat::Sqlite),
            output_table: None,
            source_table: Some(name),
            table_definition: None,
            indexes: Vec::new(),
            ..options.clone()
        };
        reports.push(ingest_from_path(path, destination, &options)?);
    }
    Ok(reports)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("data")
        .to_string()
}

/// Report a source that could not be opened, then return its error.
fn open_failed(
    path: &Path,
    table: String,
    options: &IngestionOptions,
    error: LoaderError,
) -> LoaderResult<IngestionReport> {
    let ctx = IngestionContext {
        table: options.output_table.clone().unwrap_or(table),
        source: path.display().to_string(),
        format: options.format,
    };
    let result = Err(error);
    report(&ctx, options, &result);
    result
}

/// Open the source, returning the job's table name when the source has one of its own.
fn open_source(
    path: &Path,
    fmt: IngestionFormat,
    options: &IngestionOptions,
) -> LoaderResult<(Box<dyn RowSource>, Option<String>)> {
    Ok(match fmt {
        IngestionFormat::Csv => (Box::new(CsvSource::from_path(path, &options.csv)?), None),
        IngestionFormat::Json => (Box::new(JsonSource::from_path(path)?), None),
        IngestionFormat::Parquet => (Box::new(ParquetSource::from_path(path)?), None),
        IngestionFormat::Sqlite => {
            let table = match &options.source_table {
                Some(t) => t.clone(),
                None => only_table(path)?,
            };
            (Box::new(SqliteSource::from_path(path, table.as_str())?), Some(table))
        }
    })
}

fn open_database(path: &Path) -> LoaderResult<Connection> {
    if !path.exists() {
        return Err(LoaderError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("database not found: {}", path.display()),
        )));
    }
    Ok(Connection::open_with_flags(path, rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY)?)
}

fn only_table(path: &Path) -> LoaderResult<String> {
    let conn = open_database(path)?;
    let mut names = SqliteSource::table_names(&conn)?;
    if names.len() == 1 {
        if let Some(name) = names.pop() {
            return Ok(name);
        }
    }
    Err(LoaderError::SchemaMismatch {
        message: format!(
            "set source_table (or use ingest_database) to choose among the tables in {}: {names:?}",
            path.display()
        ),
    })
}

fn infer_format_from_path(path: &Path) -> LoaderResult<IngestionFormat> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| LoaderError::SchemaMismatch {
            message: format!("cannot infer format: path has no extension ({})", path.display()),
        })?;

    IngestionFormat::from_extension(ext).ok_or_else(|| LoaderError::SchemaMismatch {
        message: format!(
            "cannot infer format from extension '{ext}' for path ({})",
            path.display()
        ),
    })
}

fn run<S, D>(
    source: &mut S,
    destination: &mut D,
    options: &IngestionOptions,
    ctx: &IngestionContext,
) -> LoaderResult<IngestionReport>
where
    S: RowSource + ?Sized,
    D: Destination + ?Sized,
{
    let authoritative = match &options.table_definition {
        Some(def) => Some(def.clone()),
        None => source.table_definition()?,
    };
    let defaults = source.default_indexes();
    let candidates = if options.auto_indexes {
        source.index_candidates()?
    } else {
        Vec::new()
    };

    let mut rows = source.records()?;
    let (mut def, sample) = match authoritative {
        Some(def) => (def, Vec::new()),
        None => match sample_and_infer(&ctx.table, &mut rows, &options.inference) {
            Ok(inferred) => inferred,
            Err(LoaderError::EmptySchema { .. }) => return Ok(IngestionReport::skipped(&ctx.table)),
            Err(e) => return Err(e),
        },
    };
    if def.is_empty() {
        return Ok(IngestionReport::skipped(&ctx.table));
    }

    def.rename(ctx.table.as_str());
    for (name, flags) in &options.interpretations {
        if let Some(column) = def.column_mut(name) {
            column.interpretation = *flags;
        }
    }
    for (name, class) in &options.storage_classes {
        if let Some(column) = def.column_mut(name) {
            column.storage_class = *class;
        }
    }

    // Checked before any statement runs so a bad index cannot fail a job after its rows landed.
    let indexes = build_index_set(&defaults, &candidates, &options.indexes);
    if let Some(missing) = indexes
        .iter()
        .flat_map(IndexSpec::columns)
        .find(|c| !def.column_names().any(|n| n.eq_ignore_ascii_case(c)))
    {
        return Err(LoaderError::SchemaMismatch {
            message: format!("index column '{missing}' is not a column of table '{}'", def.name),
        });
    }

    create_table(&mut *destination, &def)?;
    if let Some(obs) = options.observer.as_ref() {
        obs.on_table_created(ctx, &def);
    }

    let encoder = ValueEncoder::new().with_locale(options.locale.clone());
    let observer = options.observer.clone();
    let mut emitter = BatchInsertEmitter::new(&mut *destination, &def, &encoder)
        .batch_size(options.batch_size)
        .serialize_nested(options.inference.serialize_nested)
        .cancellation(options.cancellation.clone())
        .on_flush(move |stats| {
            if let Some(obs) = observer.as_ref() {
                obs.on_batch_flushed(ctx, stats);
            }
        });
    for record in sample {
        emitter.push(&record)?;
    }
    for record in rows {
        emitter.push(&record?)?;
    }
    let stats = emitter.finish()?;

    if options.cancellation.as_ref().is_some_and(CancellationToken::is_cancelled) {
        return Err(LoaderError::Cancelled {
            table: def.name.clone(),
            batches: stats.batches,
        });
    }

    create_indexes(destination, &def.name, &indexes)?;

    Ok(IngestionReport {
        table: def.name.clone(),
        rows: stats.rows,
        batches: stats.batches,
        indexes,
        skipped: false,
    })
}

fn report(ctx: &IngestionContext, options: &IngestionOptions, result: &LoaderResult<IngestionReport>) {
    let Some(obs) = options.observer.as_ref() else {
        return;
    };
    match result {
        Ok(r) if r.skipped => obs.on_skip(ctx),
        Ok(r) => obs.on_success(
            ctx,
            IngestionStats {
                rows: r.rows,
                batches: r.batches,
                indexes: r.indexes.len(),
            },
        ),
        Err(e) => {
            let sev = IngestionSeverity::for_error(e);
            obs.on_failure(ctx, sev, e);
            if sev >= options.alert_at_or_above {
                obs.on_alert(ctx, sev, e);
            }
        }
    }
}

/// Convenience helper for callers that want an owned request object.
///
/// This can be useful if you want to enqueue ingestion work in a job system. Each run opens the
/// destination database and closes it again on every exit path.
#[derive(Clone)]
pub struct IngestionRequest {
    /// Path to the input file.
    pub path: PathBuf,
    /// Destination SQLite database file.
    pub database: PathBuf,
    /// Options controlling ingestion.
    pub options: IngestionOptions,
}

impl fmt::Debug for IngestionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestionRequest")
            .field("path", &self.path)
            .field("database", &self.database)
            .field("options", &self.options)
            .finish()
    }
}

impl IngestionRequest {
    /// Execute the request by calling [`ingest_from_path`].
    pub fn run(&self) -> LoaderResult<IngestionReport> {
        let mut destination = SqliteDestination::open(&self.database)?;
        let report = ingest_from_path(&self.path, &mut destination, &self.options)?;
        destination.close()?;
        Ok(report)
    }
}
