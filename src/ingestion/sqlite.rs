//! SQLite row source: copy a table (or query results) out of another SQLite database.
//!
//! Tables have an authoritative schema read from `pragma_table_info` (declared type affinity and
//! `NOT NULL`), plus index candidates from the primary key, indexes and foreign keys. Queries
//! have no reliable schema and go through inference.

use std::collections::VecDeque;
use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, params, params_from_iter};

use crate::error::{LoaderError, LoaderResult};
use crate::types::{Column, IndexCandidate, Record, SemanticKind, TableDefinition, Value};

use super::source::{RecordIter, RowSource};

/// Rows fetched per round trip.
pub const DEFAULT_PAGE_SIZE: usize = 1_000;

const INDEX_CANDIDATES_SQL: &str = "
    SELECT      'PK_' || ?1 AS name,
                name AS column_name,
                pk AS ordinal
    FROM        pragma_table_info(?1)
    WHERE       pk > 0
    UNION
    SELECT      i.name,
                ic.name,
                ic.seqno + 1
    FROM        pragma_index_list(?1) AS i
    CROSS JOIN  pragma_index_xinfo(i.name) AS ic
    WHERE       ic.name IS NOT NULL AND ic.key = 1
    UNION
    SELECT      'FK_' || ?1 || '_' || CAST(id AS TEXT),
                \"from\",
                seq + 1
    FROM        pragma_foreign_key_list(?1)
    ORDER BY    1, 3";

const ROWID_ALIASES: [&str; 3] = ["rowid", "_rowid_", "oid"];

fn quote_table(table: &str) -> String {
    format!("\"{}\"", table.replace('"', "\"\""))
}

#[derive(Debug, Clone)]
enum Target {
    Table(String),
    Query(String),
}

/// Reads rows from a SQLite database.
#[derive(Debug)]
pub struct SqliteSource {
    label: String,
    conn: Connection,
    target: Target,
    page_size: usize,
}

impl SqliteSource {
    /// Open a database file read-only and read `table` from it.
    pub fn from_path(path: impl AsRef<Path>, table: impl Into<String>) -> LoaderResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        let table = table.into();
        Ok(Self {
            label: format!("sqlite:{}#{table}", path.display()),
            conn,
            target: Target::Table(table),
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Read `table` through an already-open connection.
    pub fn table(conn: Connection, table: impl Into<String>) -> Self {
        let table = table.into();
        Self {
            label: format!("sqlite:{table}"),
            conn,
            target: Target::Table(table),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Read the results of an arbitrary `SELECT`.
    pub fn query(conn: Connection, sql: impl Into<String>) -> Self {
        Self {
            label: "sqlite:query".to_string(),
            conn,
            target: Target::Query(sql.into()),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Rows fetched per round trip. Zero is treated as one.
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// User tables in the database, in name order.
    pub fn table_names(conn: &Connection) -> LoaderResult<Vec<String>> {
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// A name for the table's rowid that no declared column shadows, or `None` for
    /// `WITHOUT ROWID` tables.
    fn rowid_alias(&self, table: &str) -> LoaderResult<Option<&'static str>> {
        let mut stmt = self.conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
        let columns = stmt
            .query_map(params![table], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        let quoted = quote_table(table);
        Ok(ROWID_ALIASES
            .into_iter()
            .filter(|alias| !columns.iter().any(|c| c.eq_ignore_ascii_case(alias)))
            .find(|alias| self.conn.prepare(&format!("SELECT {alias} FROM {quoted}")).is_ok()))
    }

    fn select_sql(&self) -> String {
        match &self.target {
            Target::Table(table) => format!("SELECT * FROM {}", quote_table(table)),
            Target::Query(sql) => sql.trim().trim_end_matches(';').to_string(),
        }
    }
}

impl RowSource for SqliteSource {
    fn describe(&self) -> String {
        self.label.clone()
    }

    fn table_definition(&self) -> LoaderResult<Option<TableDefinition>> {
        let Target::Table(table) = &self.target else {
            return Ok(None);
        };

        let mut stmt = self
            .conn
            .prepare("SELECT name, type, \"notnull\" FROM pragma_table_info(?1) ORDER BY cid")?;
        let columns = stmt
            .query_map(params![table], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, bool>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        if columns.is_empty() {
            return Err(LoaderError::SchemaMismatch {
                message: format!("table '{table}' not found"),
            });
        }

        let mut def = TableDefinition::new(table);
        for (name, declared, not_null) in columns {
            // Untyped columns can hold anything; let inference decide.
            let Some(kind) = kind_for_declared_type(&declared) else {
                return Ok(None);
            };
            def.push(Column::new(name, kind, not_null)?);
        }
        Ok(Some(def))
    }

    fn index_candidates(&self) -> LoaderResult<Vec<IndexCandidate>> {
        let Target::Table(table) = &self.target else {
            return Ok(Vec::new());
        };

        let mut stmt = self.conn.prepare(INDEX_CANDIDATES_SQL)?;
        let candidates = stmt
            .query_map(params![table], |row| {
                Ok(IndexCandidate::new(
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(candidates)
    }

    fn records(&mut self) -> LoaderResult<RecordIter<'_>> {
        let cursor = match &self.target {
            Target::Table(table) => match self.rowid_alias(table)? {
                Some(alias) => Cursor::rowid(&quote_table(table), alias),
                None => Cursor::offset(&self.select_sql()),
            },
            Target::Query(_) => Cursor::offset(&self.select_sql()),
        };
        // Surface syntax errors and unknown tables before any row is requested.
        for sql in cursor.statements() {
            self.conn.prepare(sql)?;
        }
        Ok(Box::new(Pages {
            conn: &self.conn,
            cursor,
            page_size: self.page_size,
            buffer: VecDeque::new(),
            done: false,
        }))
    }
}

/// Map a declared column type onto a kind using SQLite's affinity rules.
///
/// Returns `None` for columns with no declared type.
pub fn kind_for_declared_type(declared: &str) -> Option<SemanticKind> {
    let t = declared.trim().to_ascii_uppercase();
    if t.is_empty() {
        return None;
    }
    let kind = if t.contains("INT") {
        SemanticKind::Int64
    } else if t.contains("CHAR") || t.contains("CLOB") || t.contains("TEXT") {
        SemanticKind::String
    } else if t.contains("BLOB") {
        SemanticKind::Bytes
    } else if t.contains("REAL") || t.contains("FLOA") || t.contains("DOUB") {
        SemanticKind::Float64
    } else if t.contains("BOOL") {
        SemanticKind::Boolean
    } else if t.contains("DATE") || t.contains("TIME") {
        // Conventionally stored as ISO-8601 text.
        SemanticKind::DateTime
    } else {
        SemanticKind::Decimal
    };
    Some(kind)
}

/// How the next page is located.
enum Cursor {
    /// Keyset on the rowid: each page starts after the last rowid seen. The rowid is selected as
    /// the first column and is not part of the record.
    Rowid {
        first: String,
        next: String,
        last: Option<i64>,
    },
    /// `LIMIT/OFFSET` over an arbitrary select (queries and `WITHOUT ROWID` tables).
    Offset { sql: String, offset: usize },
}

impl Cursor {
    fn rowid(quoted_table: &str, alias: &str) -> Self {
        Cursor::Rowid {
            first: format!("SELECT {alias}, * FROM {quoted_table} ORDER BY {alias} LIMIT ?1"),
            next: format!("SELECT {alias}, * FROM {quoted_table} WHERE {alias} > ?1 ORDER BY {alias} LIMIT ?2"),
            last: None,
        }
    }

    fn offset(select: &str) -> Self {
        Cursor::Offset {
            sql: format!("SELECT * FROM ({select}) LIMIT ?1 OFFSET ?2"),
            offset: 0,
        }
    }

    fn statements(&self) -> Vec<&str> {
        match self {
            Cursor::Rowid { first, next, .. } => vec![first.as_str(), next.as_str()],
            Cursor::Offset { sql, .. } => vec![sql.as_str()],
        }
    }

    /// Statement and bound parameters for the next page.
    fn page(&self, limit: i64) -> (&str, Vec<i64>) {
        match self {
            Cursor::Rowid { first, last: None, .. } => (first.as_str(), vec![limit]),
            Cursor::Rowid { next, last: Some(last), .. } => (next.as_str(), vec![*last, limit]),
            Cursor::Offset { sql, offset } => {
                (sql.as_str(), vec![limit, i64::try_from(*offset).unwrap_or(i64::MAX)])
            }
        }
    }

    fn key_columns(&self) -> usize {
        match self {
            Cursor::Rowid { .. } => 1,
            Cursor::Offset { .. } => 0,
        }
    }

    fn advance(&mut self, fetched: usize, last_key: Option<i64>) {
        match self {
            Cursor::Rowid { last, .. } => {
                if last_key.is_some() {
                    *last = last_key;
                }
            }
            Cursor::Offset { offset, .. } => *offset += fetched,
        }
    }
}

struct Pages<'c> {
    conn: &'c Connection,
    cursor: Cursor,
    page_size: usize,
    buffer: VecDeque<Record>,
    done: bool,
}

impl Pages<'_> {
    fn fetch(&mut self) -> LoaderResult<()> {
        let conn = self.conn;
        let limit = i64::try_from(self.page_size).unwrap_or(i64::MAX);
        let skip = self.cursor.key_columns();
        let (sql, bind) = self.cursor.page(limit);

        let mut stmt = conn.prepare_cached(sql)?;
        let names: Vec<String> = stmt
            .column_names()
            .into_iter()
            .skip(skip)
            .map(str::to_string)
            .collect();

        let mut rows = stmt.query(params_from_iter(bind))?;
        let mut fetched = 0;
        let mut last_key = None;
        while let Some(row) = rows.next()? {
            if skip > 0 {
                last_key = Some(row.get::<_, i64>(0)?);
            }
            let mut record = Record::with_capacity(names.len());
            for (i, name) in names.iter().enumerate() {
                record.push(name.as_str(), convert_value_ref(row.get_ref(i + skip)?));
            }
            self.buffer.push_back(record);
            fetched += 1;
        }
        drop(rows);
        drop(stmt);

        self.cursor.advance(fetched, last_key);
        if fetched < self.page_size {
            self.done = true;
        }
        Ok(())
    }
}

impl Iterator for Pages<'_> {
    type Item = LoaderResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.done {
            if let Err(e) = self.fetch() {
                self.done = true;
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

fn convert_value_ref(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int64(i),
        ValueRef::Real(f) => Value::Float64(f),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
    }
}
