//! Ingestion observers: logging, alerting and progress hooks.
//!
//! Attach an observer through [`super::IngestionOptions::observer`]. Every callback has a no-op
//! default, so implementors only override what they need.

use std::error::Error as StdError;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::destination::BatchStats;
use crate::error::LoaderError;
use crate::types::TableDefinition;

use super::unified::IngestionFormat;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IngestionSeverity {
    /// Informational event.
    Info,
    /// Warning-level event (non-fatal, e.g. a cancelled job).
    Warning,
    /// Error-level event (job failed).
    Error,
    /// Critical error (I/O or destination failures).
    Critical,
}

impl IngestionSeverity {
    /// Severity of a job failure.
    pub fn for_error(e: &LoaderError) -> Self {
        match e {
            LoaderError::Io(_) | LoaderError::Sqlite(_) => IngestionSeverity::Critical,
            LoaderError::DestinationExecutionFailure { .. } => IngestionSeverity::Critical,
            LoaderError::Csv(err) => match err.kind() {
                ::csv::ErrorKind::Io(_) => IngestionSeverity::Critical,
                _ => IngestionSeverity::Error,
            },
            LoaderError::Cancelled { .. } | LoaderError::EmptySchema { .. } => IngestionSeverity::Warning,
            LoaderError::UnsupportedSourceType { .. }
            | LoaderError::TypeConversionUnsupported { .. }
            | LoaderError::AmbiguousStringValue { .. }
            | LoaderError::SchemaMismatch { .. }
            | LoaderError::Json { .. } => IngestionSeverity::Error,
            LoaderError::Parquet(err) => {
                // Parquet errors often wrap IO, but not always in a structured way.
                if error_chain_contains_io(err) {
                    IngestionSeverity::Critical
                } else {
                    IngestionSeverity::Error
                }
            }
        }
    }
}

fn error_chain_contains_io(e: &(dyn StdError + 'static)) -> bool {
    let mut cur: Option<&(dyn StdError + 'static)> = Some(e);
    while let Some(err) = cur {
        if err.is::<std::io::Error>() {
            return true;
        }
        cur = err.source();
    }
    false
}

/// Context about an ingestion job.
#[derive(Debug, Clone)]
pub struct IngestionContext {
    /// Destination table name.
    pub table: String,
    /// Human-readable source label (e.g. `csv:data/people.csv`).
    pub source: String,
    /// File format, when the job was started from a path.
    pub format: Option<IngestionFormat>,
}

/// Stats reported on successful ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestionStats {
    /// Number of rows written.
    pub rows: usize,
    /// Number of INSERT statements executed.
    pub batches: usize,
    /// Number of indexes created.
    pub indexes: usize,
}

/// Observer interface for ingestion outcomes.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait IngestionObserver: Send + Sync {
    /// Called once the destination table exists.
    fn on_table_created(&self, _ctx: &IngestionContext, _table: &TableDefinition) {}

    /// Called after every INSERT batch with running totals.
    fn on_batch_flushed(&self, _ctx: &IngestionContext, _stats: BatchStats) {}

    /// Called when the job is skipped because no columns were discovered.
    fn on_skip(&self, _ctx: &IngestionContext) {}

    /// Called when ingestion succeeds.
    fn on_success(&self, _ctx: &IngestionContext, _stats: IngestionStats) {}

    /// Called when ingestion fails.
    fn on_failure(&self, _ctx: &IngestionContext, _severity: IngestionSeverity, _error: &LoaderError) {}

    /// Called when an ingestion failure meets an alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &LoaderError) {
        self.on_failure(ctx, severity, error)
    }
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn IngestionObserver>>,
}

impl CompositeObserver {
    /// Create a new composite observer from a list of observers.
    pub fn new(observers: Vec<Arc<dyn IngestionObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl IngestionObserver for CompositeObserver {
    fn on_table_created(&self, ctx: &IngestionContext, table: &TableDefinition) {
        for o in &self.observers {
            o.on_table_created(ctx, table);
        }
    }

    fn on_batch_flushed(&self, ctx: &IngestionContext, stats: BatchStats) {
        for o in &self.observers {
            o.on_batch_flushed(ctx, stats);
        }
    }

    fn on_skip(&self, ctx: &IngestionContext) {
        for o in &self.observers {
            o.on_skip(ctx);
        }
    }

    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        for o in &self.observers {
            o.on_success(ctx, stats);
        }
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &LoaderError) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &LoaderError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }
}

/// Logs ingestion events to stderr.
#[derive(Debug, Default)]
pub struct StdErrObserver;

impl IngestionObserver for StdErrObserver {
    fn on_table_created(&self, ctx: &IngestionContext, table: &TableDefinition) {
        eprintln!(
            "[ingest][table] source={} table={} columns={}",
            ctx.source,
            ctx.table,
            table.len()
        );
    }

    fn on_skip(&self, ctx: &IngestionContext) {
        eprintln!("[ingest][skip] source={} table={} no columns", ctx.source, ctx.table);
    }

    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        eprintln!(
            "[ingest][ok] source={} table={} rows={} batches={} indexes={}",
            ctx.source, ctx.table, stats.rows, stats.batches, stats.indexes
        );
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &LoaderError) {
        eprintln!(
            "[ingest][{:?}] source={} table={} err={}",
            severity, ctx.source, ctx.table, error
        );
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &LoaderError) {
        eprintln!(
            "[ALERT][ingest][{:?}] source={} table={} err={}",
            severity, ctx.source, ctx.table, error
        );
    }
}

/// Appends ingestion events to a local log file.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Create a file observer that appends events to `path`.
    ///
    /// Writes are best-effort; failures to open/write the log file are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{line}");
        }
    }
}

impl IngestionObserver for FileObserver {
    fn on_batch_flushed(&self, ctx: &IngestionContext, stats: BatchStats) {
        self.append_line(&format!(
            "{} batch table={} rows={} batches={}",
            unix_ts(),
            ctx.table,
            stats.rows,
            stats.batches
        ));
    }

    fn on_skip(&self, ctx: &IngestionContext) {
        self.append_line(&format!(
            "{} skip source={} table={}",
            unix_ts(),
            ctx.source,
            ctx.table
        ));
    }

    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        self.append_line(&format!(
            "{} ok source={} table={} rows={} batches={} indexes={}",
            unix_ts(),
            ctx.source,
            ctx.table,
            stats.rows,
            stats.batches,
            stats.indexes
        ));
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &LoaderError) {
        self.append_line(&format!(
            "{} fail severity={:?} source={} table={} err={}",
            unix_ts(),
            severity,
            ctx.source,
            ctx.table,
            error
        ));
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &LoaderError) {
        self.append_line(&format!(
            "{} ALERT severity={:?} source={} table={} err={}",
            unix_ts(),
            severity,
            ctx.source,
            ctx.table,
            error
        ));
    }
}

fn unix_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
