//! Core data model types.
//!
//! Sources hand the loader typed [`Value`]s; each value knows its [`SemanticKind`]. A
//! [`TableDefinition`] (an ordered list of [`Column`]s) decides which [`StorageClass`] each
//! column is written as, and [`IndexSpec`]s describe the indexes created afterwards.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use chrono::{DateTime, FixedOffset, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::destination::storage_class;
use crate::error::LoaderResult;

/// Target literal encodings understood by the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageClass {
    /// Signed integer.
    Integer,
    /// 8-byte IEEE float.
    Real,
    /// UTF-8 text.
    Text,
    /// Raw bytes.
    Blob,
    /// Exact numeric (decimal text with numeric affinity).
    Numeric,
}

impl StorageClass {
    /// Type name used in `CREATE TABLE`.
    pub fn as_sql(self) -> &'static str {
        match self {
            StorageClass::Integer => "INTEGER",
            StorageClass::Real => "REAL",
            StorageClass::Text => "TEXT",
            StorageClass::Blob => "BLOB",
            StorageClass::Numeric => "NUMERIC",
        }
    }
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Language-agnostic classification of a source value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SemanticKind {
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    /// Arbitrary-precision decimal.
    Decimal,
    /// A single character.
    Char,
    /// A character sequence.
    String,
    /// A single byte.
    Byte,
    /// A byte sequence.
    Bytes,
    /// Date/time without an offset.
    DateTime,
    /// Date/time with a UTC offset.
    DateTimeOffset,
    Uuid,
    /// Nested document or array.
    Nested,
    /// Time of day with no date. Has no storage class.
    Time,
    /// Only nulls have been observed.
    Null,
}

impl fmt::Display for SemanticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SemanticKind::Boolean => "boolean",
            SemanticKind::Int8 => "int8",
            SemanticKind::Int16 => "int16",
            SemanticKind::Int32 => "int32",
            SemanticKind::Int64 => "int64",
            SemanticKind::Float32 => "float32",
            SemanticKind::Float64 => "float64",
            SemanticKind::Decimal => "decimal",
            SemanticKind::Char => "char",
            SemanticKind::String => "string",
            SemanticKind::Byte => "byte",
            SemanticKind::Bytes => "bytes",
            SemanticKind::DateTime => "datetime",
            SemanticKind::DateTimeOffset => "datetimeoffset",
            SemanticKind::Uuid => "uuid",
            SemanticKind::Nested => "nested",
            SemanticKind::Time => "time",
            SemanticKind::Null => "null",
        };
        f.write_str(name)
    }
}

/// A single typed source value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing/null value.
    Null,
    Boolean(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Decimal(Decimal),
    Char(char),
    String(String),
    Byte(u8),
    Bytes(Vec<u8>),
    DateTime(NaiveDateTime),
    DateTimeOffset(DateTime<FixedOffset>),
    Uuid(Uuid),
    /// JSON object or array.
    Nested(serde_json::Value),
    Time(NaiveTime),
}

impl Value {
    /// The semantic kind carried by this value.
    pub fn kind(&self) -> SemanticKind {
        match self {
            Value::Null => SemanticKind::Null,
            Value::Boolean(_) => SemanticKind::Boolean,
            Value::Int8(_) => SemanticKind::Int8,
            Value::Int16(_) => SemanticKind::Int16,
            Value::Int32(_) => SemanticKind::Int32,
            Value::Int64(_) => SemanticKind::Int64,
            Value::Float32(_) => SemanticKind::Float32,
            Value::Float64(_) => SemanticKind::Float64,
            Value::Decimal(_) => SemanticKind::Decimal,
            Value::Char(_) => SemanticKind::Char,
            Value::String(_) => SemanticKind::String,
            Value::Byte(_) => SemanticKind::Byte,
            Value::Bytes(_) => SemanticKind::Bytes,
            Value::DateTime(_) => SemanticKind::DateTime,
            Value::DateTimeOffset(_) => SemanticKind::DateTimeOffset,
            Value::Uuid(_) => SemanticKind::Uuid,
            Value::Nested(_) => SemanticKind::Nested,
            Value::Time(_) => SemanticKind::Time,
        }
    }

    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

/// How ambiguous string data is interpreted before it is encoded.
///
/// Flags combine with `|`:
///
/// ```rust
/// use sqlite_loader::types::Interpretation;
///
/// let flags = Interpretation::EMPTY_STRING_IS_NULL | Interpretation::STRIP_ALPHA;
/// assert!(flags.contains(Interpretation::STRIP_ALPHA));
/// assert!(!flags.contains(Interpretation::HEX));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Interpretation(u8);

impl Interpretation {
    /// Literal interpretation with no preprocessing.
    pub const NONE: Self = Self(0);
    /// Treat an empty string as null.
    pub const EMPTY_STRING_IS_NULL: Self = Self(1);
    /// Treat the text `null` (any case) as null.
    pub const LITERAL_NULL_IS_NULL: Self = Self(1 << 1);
    /// The string is binary encoded as base64.
    pub const BASE64: Self = Self(1 << 2);
    /// The string is binary encoded as hexadecimal, optionally `0x`-prefixed.
    pub const HEX: Self = Self(1 << 3);
    /// Strip everything but digits, the decimal separator and `-` before parsing as a number.
    pub const STRIP_ALPHA: Self = Self(1 << 4);
    /// The string is a date in the configured local format.
    pub const LOCAL_DATE: Self = Self(1 << 5);

    /// Returns `true` if every flag in `other` is set.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if no flag is set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Interpretation {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Interpretation {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Locale rules used by [`Interpretation::STRIP_ALPHA`] and [`Interpretation::LOCAL_DATE`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocaleSettings {
    /// Decimal separator kept by `STRIP_ALPHA`.
    pub decimal_separator: char,
    /// `chrono` format strings tried in order by `LOCAL_DATE`. Date-only patterns parse to
    /// midnight.
    pub date_formats: Vec<String>,
}

impl Default for LocaleSettings {
    fn default() -> Self {
        Self {
            decimal_separator: '.',
            date_formats: vec![
                "%d/%m/%Y %H:%M:%S".to_string(),
                "%d/%m/%Y %H:%M".to_string(),
                "%d/%m/%Y".to_string(),
                "%Y-%m-%d %H:%M:%S".to_string(),
                "%Y-%m-%d".to_string(),
            ],
        }
    }
}

/// A column in a destination table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name, unique within its table.
    pub name: String,
    /// Semantic kind of the source values.
    pub kind: SemanticKind,
    /// Storage class the values are written as.
    pub storage_class: StorageClass,
    /// Whether the column is `NOT NULL`.
    pub required: bool,
    /// How ambiguous string values are decoded.
    #[serde(default)]
    pub interpretation: Interpretation,
}

impl Column {
    /// Create a column whose storage class is derived from `kind`.
    pub fn new(name: impl Into<String>, kind: SemanticKind, required: bool) -> LoaderResult<Self> {
        let name = name.into();
        let storage_class = storage_class::for_column(&name, kind)?;
        Ok(Self {
            name,
            kind,
            storage_class,
            required,
            interpretation: Interpretation::NONE,
        })
    }

    /// Create a column with an explicit storage class, overriding the derived one.
    pub fn with_storage_class(
        name: impl Into<String>,
        kind: SemanticKind,
        storage_class: StorageClass,
        required: bool,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            storage_class,
            required,
            interpretation: Interpretation::NONE,
        }
    }

    /// Set the string interpretation flags.
    pub fn with_interpretation(mut self, interpretation: Interpretation) -> Self {
        self.interpretation = interpretation;
        self
    }
}

/// A destination table: a name and an ordered set of uniquely named columns.
///
/// Column order drives literal tuple order in INSERT statements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    /// Table name.
    pub name: String,
    columns: Vec<Column>,
}

impl TableDefinition {
    /// Create an empty definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Create a definition from columns. Later duplicates replace earlier ones in place.
    pub fn with_columns(name: impl Into<String>, columns: Vec<Column>) -> Self {
        let mut def = Self::new(name);
        for c in columns {
            def.push(c);
        }
        def
    }

    /// Append a column, or replace the column with the same name keeping its position.
    pub fn push(&mut self, column: Column) {
        match self.index_of(&column.name) {
            Some(idx) => self.columns[idx] = column,
            None => self.columns.push(column),
        }
    }

    /// Columns in table order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Mutable access to a column by name (interpretation overrides).
    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Returns the position of a column by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Iterate column names in order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if there are no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Change the output table name. This is the only change allowed once a job has started.
    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }
}

/// An ordered sequence of column names. Equality is sequence equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexSpec(Vec<String>);

impl IndexSpec {
    /// Create an index spec from column names.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(columns.into_iter().map(Into::into).collect())
    }

    /// Column names in index order.
    pub fn columns(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One column of an index harvested from source metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexCandidate {
    /// Name of the owning index, key or constraint.
    pub name: String,
    /// Column name.
    pub column: String,
    /// Position of the column within the owning object.
    pub ordinal: i64,
}

impl IndexCandidate {
    pub fn new(name: impl Into<String>, column: impl Into<String>, ordinal: i64) -> Self {
        Self {
            name: name.into(),
            column: column.into(),
            ordinal,
        }
    }
}

/// One source record: named field observations in source order.
///
/// A field that is not present is distinct from a field present with [`Value::Null`]; schema
/// inference treats both as optional, encoding writes both as `NULL`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    /// Set a field. A repeated name replaces the earlier value in place.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Builder-style [`Self::push`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(name, value);
        self
    }

    /// Value of a field, if present.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Fields in source order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.push(k, v);
        }
        record
    }
}
