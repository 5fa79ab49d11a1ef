//! JSON row source.
//!
//! Supported inputs:
//! - A JSON array of objects: `[{"a":1}, {"a":2}]`
//! - A single object: `{"a":1}`
//! - Newline-delimited JSON (NDJSON): `{"a":1}\n{"a":2}\n`
//!
//! Integral numbers become [`Value::Int64`] (or [`Value::Decimal`] past `i64::MAX`), other
//! numbers [`Value::Float64`]. Objects and arrays are kept as [`Value::Nested`] documents.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;

use rust_decimal::Decimal;

use crate::error::{LoaderError, LoaderResult};
use crate::types::{Record, Value};

use super::source::{RecordIter, RowSource};

enum JsonInput {
    Documents(Vec<serde_json::Value>),
    Lines(Box<dyn BufRead>),
}

/// Reads top-level JSON objects as records.
pub struct JsonSource {
    label: String,
    input: Option<JsonInput>,
}

impl std::fmt::Debug for JsonSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let input = match &self.input {
            Some(JsonInput::Documents(docs)) => format!("{} document(s)", docs.len()),
            Some(JsonInput::Lines(_)) => "ndjson stream".to_string(),
            None => "consumed".to_string(),
        };
        f.debug_struct("JsonSource")
            .field("label", &self.label)
            .field("input", &input)
            .finish()
    }
}

impl JsonSource {
    /// Open a JSON file. `.jsonl` and `.ndjson` files are streamed line by line; anything else
    /// is parsed as a whole, falling back to NDJSON.
    pub fn from_path(path: impl AsRef<Path>) -> LoaderResult<Self> {
        let path = path.as_ref();
        let label = format!("json:{}", path.display());
        let streamed = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("jsonl") || e.eq_ignore_ascii_case("ndjson"));

        if streamed {
            let file = File::open(path)?;
            return Ok(Self {
                label,
                input: Some(JsonInput::Lines(Box::new(BufReader::new(file)))),
            });
        }

        let text = fs::read_to_string(path)?;
        Ok(Self::parse(&text)?.with_label(label))
    }

    /// Parse JSON held in memory.
    pub fn parse(input: &str) -> LoaderResult<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(Self::documents(Vec::new()));
        }

        // First try parsing as a single JSON value (array or object).
        if let Ok(v) = serde_json::from_str::<serde_json::Value>(trimmed) {
            return match v {
                serde_json::Value::Array(items) => Ok(Self::documents(items)),
                serde_json::Value::Object(_) => Ok(Self::documents(vec![v])),
                _ => Err(LoaderError::SchemaMismatch {
                    message: "json must be an object, an array of objects, or NDJSON".to_string(),
                }),
            };
        }

        // Fall back to NDJSON.
        let mut values = Vec::new();
        for (i, line) in trimmed.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let v = serde_json::from_str::<serde_json::Value>(line)
                .map_err(|source| LoaderError::Json { line: i + 1, source })?;
            values.push(v);
        }
        Ok(Self::documents(values))
    }

    /// Stream NDJSON from a buffered reader.
    pub fn from_ndjson_reader(reader: impl BufRead + 'static) -> Self {
        Self {
            label: "ndjson:reader".to_string(),
            input: Some(JsonInput::Lines(Box::new(reader))),
        }
    }

    fn documents(docs: Vec<serde_json::Value>) -> Self {
        Self {
            label: "json:memory".to_string(),
            input: Some(JsonInput::Documents(docs)),
        }
    }

    fn with_label(mut self, label: String) -> Self {
        self.label = label;
        self
    }
}

impl RowSource for JsonSource {
    fn describe(&self) -> String {
        self.label.clone()
    }

    fn records(&mut self) -> LoaderResult<RecordIter<'_>> {
        let input = self.input.take().ok_or_else(|| LoaderError::SchemaMismatch {
            message: format!("{} has already been read", self.label),
        })?;

        match input {
            JsonInput::Documents(docs) => Ok(Box::new(
                docs.into_iter()
                    .enumerate()
                    .map(|(idx0, doc)| object_to_record(idx0 + 1, doc)),
            )),
            JsonInput::Lines(reader) => Ok(Box::new(
                reader
                    .lines()
                    .enumerate()
                    .filter(|(_, line)| line.as_ref().map_or(true, |l| !l.trim().is_empty()))
                    .map(|(idx0, line)| {
                        let line = line?;
                        let doc = serde_json::from_str::<serde_json::Value>(line.trim())
                            .map_err(|source| LoaderError::Json { line: idx0 + 1, source })?;
                        object_to_record(idx0 + 1, doc)
                    }),
            )),
        }
    }
}

fn object_to_record(row_num: usize, doc: serde_json::Value) -> LoaderResult<Record> {
    let serde_json::Value::Object(obj) = doc else {
        return Err(LoaderError::SchemaMismatch {
            message: format!("row {row_num} is not a json object"),
        });
    };

    let mut record = Record::with_capacity(obj.len());
    for (name, v) in obj {
        record.push(name, convert_json_value(v));
    }
    Ok(record)
}

/// Map a JSON value onto the closest [`Value`].
pub fn convert_json_value(v: serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Boolean(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int64(i)
            } else if let Some(u) = n.as_u64() {
                Value::Decimal(Decimal::from(u))
            } else {
                n.as_f64().map_or(Value::Null, Value::Float64)
            }
        }
        serde_json::Value::String(s) => Value::String(s),
        nested @ (serde_json::Value::Array(_) | serde_json::Value::Object(_)) => Value::Nested(nested),
    }
}
