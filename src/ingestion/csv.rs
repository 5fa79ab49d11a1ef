//! CSV row source.
//!
//! CSV carries no types, so every non-empty cell is read as [`Value::String`] and empty cells as
//! [`Value::Null`]. Numeric, binary and date columns are handled through column
//! [`crate::types::Interpretation`] flags or an explicit [`crate::types::TableDefinition`].

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LoaderError, LoaderResult};
use crate::types::{Record, Value};

use super::source::{RecordIter, RowSource};

/// CSV parsing options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvOptions {
    /// Field delimiter.
    pub delimiter: u8,
    /// Quote character.
    pub quote: u8,
    /// Trim surrounding whitespace from headers and cells.
    pub trim: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            trim: true,
        }
    }
}

impl CsvOptions {
    fn reader_builder(&self) -> csv::ReaderBuilder {
        let mut builder = csv::ReaderBuilder::new();
        builder
            .has_headers(true)
            .delimiter(self.delimiter)
            .quote(self.quote)
            .trim(if self.trim { csv::Trim::All } else { csv::Trim::None });
        builder
    }
}

/// Reads records from CSV with a header row.
pub struct CsvSource<R: Read> {
    label: String,
    headers: Vec<String>,
    reader: Option<csv::Reader<R>>,
}

impl<R: Read> std::fmt::Debug for CsvSource<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvSource")
            .field("label", &self.label)
            .field("headers", &self.headers)
            .field("consumed", &self.reader.is_none())
            .finish()
    }
}

impl CsvSource<File> {
    /// Open a CSV file.
    pub fn from_path(path: impl AsRef<Path>, options: &CsvOptions) -> LoaderResult<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let reader = options.reader_builder().from_path(&path)?;
        Self::new(format!("csv:{}", path.display()), reader)
    }
}

impl<R: Read> CsvSource<R> {
    /// Read CSV from any reader.
    pub fn from_reader(reader: R, options: &CsvOptions) -> LoaderResult<Self> {
        Self::new("csv:reader".to_string(), options.reader_builder().from_reader(reader))
    }

    fn new(label: String, mut reader: csv::Reader<R>) -> LoaderResult<Self> {
        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if let Some(dup) = first_duplicate(&headers) {
            return Err(LoaderError::SchemaMismatch {
                message: format!("duplicate csv header '{dup}'. headers={headers:?}"),
            });
        }
        Ok(Self {
            label,
            headers,
            reader: Some(reader),
        })
    }

    /// Header names in file order.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }
}

impl<R: Read> RowSource for CsvSource<R> {
    fn describe(&self) -> String {
        self.label.clone()
    }

    fn records(&mut self) -> LoaderResult<RecordIter<'_>> {
        let reader = self.reader.take().ok_or_else(|| LoaderError::SchemaMismatch {
            message: format!("{} has already been read", self.label),
        })?;
        let headers = &self.headers;
        Ok(Box::new(reader.into_records().map(move |result| {
            let row = result?;
            let mut record = Record::with_capacity(headers.len());
            for (name, raw) in headers.iter().zip(row.iter()) {
                let value = if raw.is_empty() {
                    Value::Null
                } else {
                    Value::String(raw.to_string())
                };
                record.push(name.as_str(), value);
            }
            Ok(record)
        })))
    }
}

fn first_duplicate(headers: &[String]) -> Option<&str> {
    headers
        .iter()
        .enumerate()
        .find(|(i, h)| headers[..*i].contains(h))
        .map(|(_, h)| h.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(input: &str) -> LoaderResult<Vec<Record>> {
        let mut source = CsvSource::from_reader(input.as_bytes(), &CsvOptions::default())?;
        source.records()?.collect()
    }

    #[test]
    fn cells_are_strings_and_empty_cells_are_null() {
        let records = read_all("id,name\n1, Ada \n2,\n").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("id"), Some(&Value::String("1".to_string())));
        assert_eq!(records[0].get("name"), Some(&Value::String("Ada".to_string())));
        assert_eq!(records[1].get("name"), Some(&Value::Null));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let mut source = CsvSource::from_reader(
            "a,b,c\n1,2\n".as_bytes(),
            &CsvOptions::default(),
        )
        .unwrap();
        let result: LoaderResult<Vec<Record>> = source.records().unwrap().collect();
        assert!(matches!(result, Err(LoaderError::Csv(_))));
    }

    #[test]
    fn duplicate_headers_are_rejected() {
        let err = read_all("a,b,a\n1,2,3\n").unwrap_err();
        assert!(err.to_string().contains("duplicate csv header 'a'"));
    }

    #[test]
    fn records_can_only_be_read_once() {
        let mut source = CsvSource::from_reader("a\n1\n".as_bytes(), &CsvOptions::default()).unwrap();
        assert_eq!(source.records().unwrap().count(), 1);
        assert!(source.records().is_err());
    }

    #[test]
    fn semicolon_delimiter() {
        let opts = CsvOptions {
            delimiter: b';',
            ..Default::default()
        };
        let mut source = CsvSource::from_reader("a;b\nx;y\n".as_bytes(), &opts).unwrap();
        let rows: Vec<Record> = source.records().unwrap().collect::<LoaderResult<_>>().unwrap();
        assert_eq!(rows[0].get("b"), Some(&Value::String("y".to_string())));
    }
}
