//! Destination side: storage classes, literal encoding, DDL/DML rendering and sinks.
//!
//! The destination is any SQL engine that accepts statement text and honours
//! `IF NOT EXISTS`. [`SqliteDestination`] targets an embedded SQLite database through
//! `rusqlite`; [`ScriptDestination`] writes the statements to any [`std::io::Write`] instead
//! (SQL export / dry run).
//!
//! - [`storage_class`]: semantic kind to storage class mapping
//! - [`encode`]: value encoder
//! - [`batch`]: batch insert emitter
//! - [`indexes`]: index set builder
//! - [`sql`]: statement rendering

pub mod batch;
pub mod encode;
pub mod indexes;
pub mod sql;
pub mod storage_class;

use std::fmt;
use std::io::Write;
use std::path::Path;

use rusqlite::Connection;

use crate::error::{DestinationError, LoaderError, LoaderResult};
use crate::types::{IndexSpec, TableDefinition};

pub use batch::{BatchInsertEmitter, BatchStats, CancellationToken, DEFAULT_BATCH_SIZE, emit_rows};
pub use encode::ValueEncoder;
pub use indexes::{build_index_set, group_candidates};

/// A sink that executes SQL statement text, one statement (or batch) at a time.
///
/// Implementations are used by a single job at a time; the job holds `&mut` for its duration.
pub trait Destination {
    /// Execute one statement. Errors are reported as-is; the caller adds table context.
    fn execute(&mut self, sql: &str) -> Result<(), DestinationError>;
}

enum Handle<'c> {
    Owned(Connection),
    Borrowed(&'c Connection),
}

/// SQLite destination.
///
/// A destination opened by [`SqliteDestination::open`] owns its connection and closes it when
/// dropped (or explicitly via [`SqliteDestination::close`]), on success and failure alike. A
/// destination built with [`SqliteDestination::borrowed`] leaves the caller's connection open.
pub struct SqliteDestination<'c> {
    handle: Handle<'c>,
}

impl fmt::Debug for SqliteDestination<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteDestination")
            .field("owned", &matches!(self.handle, Handle::Owned(_)))
            .finish()
    }
}

impl SqliteDestination<'static> {
    /// Open (creating if needed) a database file.
    pub fn open(path: impl AsRef<Path>) -> LoaderResult<Self> {
        Ok(Self {
            handle: Handle::Owned(Connection::open(path)?),
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> LoaderResult<Self> {
        Ok(Self {
            handle: Handle::Owned(Connection::open_in_memory()?),
        })
    }
}

impl<'c> SqliteDestination<'c> {
    /// Use an already-open connection without taking ownership of it.
    pub fn borrowed(conn: &'c Connection) -> Self {
        Self {
            handle: Handle::Borrowed(conn),
        }
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Connection {
        match &self.handle {
            Handle::Owned(c) => c,
            Handle::Borrowed(c) => *c,
        }
    }

    /// Drop `table` (and its indexes) if it exists, e.g. to reload it from scratch.
    pub fn drop_table(&mut self, table: &str) -> LoaderResult<()> {
        let statement = sql::drop_table(table);
        self.execute(&statement)
            .map_err(|e| LoaderError::destination(table, &statement, e))
    }

    /// Rebuild the database file, reclaiming space left by dropped tables and deleted rows.
    ///
    /// Fails if a transaction is open on the connection.
    pub fn vacuum(&mut self) -> LoaderResult<()> {
        self.connection().execute_batch("VACUUM;")?;
        Ok(())
    }

    /// Close an owned connection, reporting any error. Borrowed connections are left open.
    pub fn close(self) -> LoaderResult<()> {
        match self.handle {
            Handle::Owned(c) => c.close().map_err(|(_, e)| LoaderError::Sqlite(e)),
            Handle::Borrowed(_) => Ok(()),
        }
    }
}

impl Destination for SqliteDestination<'_> {
    fn execute(&mut self, sql: &str) -> Result<(), DestinationError> {
        self.connection().execute_batch(sql)?;
        Ok(())
    }
}

/// Writes each statement, followed by a newline, to a writer.
#[derive(Debug)]
pub struct ScriptDestination<W: Write> {
    writer: W,
}

impl<W: Write> ScriptDestination<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Destination for ScriptDestination<W> {
    fn execute(&mut self, sql: &str) -> Result<(), DestinationError> {
        writeln!(self.writer, "{sql}")?;
        Ok(())
    }
}

/// Issue `CREATE TABLE IF NOT EXISTS` for `def`.
pub fn create_table<D: Destination + ?Sized>(destination: &mut D, def: &TableDefinition) -> LoaderResult<()> {
    let statement = sql::create_table(def);
    destination
        .execute(&statement)
        .map_err(|e| LoaderError::destination(&def.name, &statement, e))
}

/// Issue one `CREATE INDEX IF NOT EXISTS` per spec.
pub fn create_indexes<D: Destination + ?Sized>(
    destination: &mut D,
    table: &str,
    indexes: &[IndexSpec],
) -> LoaderResult<()> {
    for index in indexes {
        let statement = sql::create_index(table, index);
        destination
            .execute(&statement)
            .map_err(|e| LoaderError::destination(table, &statement, e))?;
    }
    Ok(())
}
