//! Parquet row source.
//!
//! Parquet files carry an authoritative schema, so inference is skipped: each top-level field
//! becomes a column whose kind comes from its physical and logical type, and which is required
//! when the field's repetition is `REQUIRED`. Groups and repeated fields become nested columns.

use std::fs::File;
use std::path::Path;

use chrono::{DateTime, NaiveTime};
use parquet::basic::{ConvertedType, LogicalType, Repetition, Type as PhysicalType};
use parquet::file::reader::FileReader;
use parquet::file::serialized_reader::SerializedFileReader;
use parquet::record::{Field, Row};
use parquet::schema::types::Type as SchemaType;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{LoaderError, LoaderResult};
use crate::types::{Column, Record, SemanticKind, TableDefinition, Value};

use super::source::{RecordIter, RowSource};

#[derive(Debug, Clone)]
struct FieldInfo {
    name: String,
    kind: SemanticKind,
    required: bool,
}

/// Reads rows from a Parquet file.
pub struct ParquetSource {
    label: String,
    table: String,
    fields: Vec<FieldInfo>,
    reader: Option<SerializedFileReader<File>>,
}

impl std::fmt::Debug for ParquetSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParquetSource")
            .field("label", &self.label)
            .field("fields", &self.fields)
            .field("consumed", &self.reader.is_none())
            .finish()
    }
}

impl ParquetSource {
    /// Open a Parquet file and read its schema.
    pub fn from_path(path: impl AsRef<Path>) -> LoaderResult<Self> {
        let path = path.as_ref();
        let reader = SerializedFileReader::try_from(path)?;
        let fields = reader
            .metadata()
            .file_metadata()
            .schema_descr()
            .root_schema()
            .get_fields()
            .iter()
            .map(|t| FieldInfo {
                name: t.name().to_string(),
                kind: kind_for(t),
                required: is_required(t),
            })
            .collect();

        Ok(Self {
            label: format!("parquet:{}", path.display()),
            table: path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("parquet")
                .to_string(),
            fields,
            reader: Some(reader),
        })
    }
}

impl RowSource for ParquetSource {
    fn describe(&self) -> String {
        self.label.clone()
    }

    fn table_definition(&self) -> LoaderResult<Option<TableDefinition>> {
        let mut def = TableDefinition::new(&self.table);
        for f in &self.fields {
            def.push(Column::new(&f.name, f.kind, f.required)?);
        }
        Ok(Some(def))
    }

    fn records(&mut self) -> LoaderResult<RecordIter<'_>> {
        let reader = self.reader.take().ok_or_else(|| LoaderError::SchemaMismatch {
            message: format!("{} has already been read", self.label),
        })?;
        let fields = &self.fields;
        Ok(Box::new(reader.into_iter().enumerate().map(move |(idx0, row)| {
            let row = row?;
            row_to_record(idx0 + 1, fields, &row)
        })))
    }
}

fn is_required(t: &SchemaType) -> bool {
    let info = t.get_basic_info();
    info.has_repetition() && info.repetition() == Repetition::REQUIRED
}

fn kind_for(t: &SchemaType) -> SemanticKind {
    let info = t.get_basic_info();
    if t.is_group() || (info.has_repetition() && info.repetition() == Repetition::REPEATED) {
        return SemanticKind::Nested;
    }

    let logical = info.logical_type();
    let converted = info.converted_type();
    match t.get_physical_type() {
        PhysicalType::BOOLEAN => SemanticKind::Boolean,
        PhysicalType::INT32 => match (logical, converted) {
            (Some(LogicalType::Integer { bit_width: 8, .. }), _)
            | (_, ConvertedType::INT_8 | ConvertedType::UINT_8) => SemanticKind::Int8,
            (Some(LogicalType::Integer { bit_width: 16, .. }), _)
            | (_, ConvertedType::INT_16 | ConvertedType::UINT_16) => SemanticKind::Int16,
            (Some(LogicalType::Date), _) | (_, ConvertedType::DATE) => SemanticKind::DateTime,
            (Some(LogicalType::Decimal { .. }), _) | (_, ConvertedType::DECIMAL) => SemanticKind::Decimal,
            (Some(LogicalType::Time { .. }), _) | (_, ConvertedType::TIME_MILLIS) => SemanticKind::Time,
            _ => SemanticKind::Int32,
        },
        PhysicalType::INT64 => match (logical, converted) {
            (Some(LogicalType::Timestamp { .. }), _)
            | (_, ConvertedType::TIMESTAMP_MILLIS | ConvertedType::TIMESTAMP_MICROS) => SemanticKind::DateTime,
            (Some(LogicalType::Decimal { .. }), _) | (_, ConvertedType::DECIMAL) => SemanticKind::Decimal,
            (Some(LogicalType::Time { .. }), _) | (_, ConvertedType::TIME_MICROS) => SemanticKind::Time,
            // u64 values above i64::MAX do not fit a signed integer column.
            (Some(LogicalType::Integer { bit_width: 64, is_signed: false }), _) | (_, ConvertedType::UINT_64) => {
                SemanticKind::Decimal
            }
            _ => SemanticKind::Int64,
        },
        PhysicalType::INT96 => SemanticKind::DateTime,
        PhysicalType::FLOAT => SemanticKind::Float32,
        PhysicalType::DOUBLE => SemanticKind::Float64,
        PhysicalType::BYTE_ARRAY => match (logical, converted) {
            (Some(LogicalType::String | LogicalType::Enum | LogicalType::Json), _)
            | (_, ConvertedType::UTF8 | ConvertedType::ENUM | ConvertedType::JSON) => SemanticKind::String,
            (Some(LogicalType::Decimal { .. }), _) | (_, ConvertedType::DECIMAL) => SemanticKind::Decimal,
            _ => SemanticKind::Bytes,
        },
        PhysicalType::FIXED_LEN_BYTE_ARRAY => match (logical, converted) {
            (Some(LogicalType::Uuid), _) => SemanticKind::Uuid,
            (Some(LogicalType::Float16), _) => SemanticKind::Float32,
            (Some(LogicalType::Decimal { .. }), _) | (_, ConvertedType::DECIMAL) => SemanticKind::Decimal,
            _ => SemanticKind::Bytes,
        },
    }
}

fn row_to_record(row_num: usize, fields: &[FieldInfo], row: &Row) -> LoaderResult<Record> {
    let mut record = Record::with_capacity(fields.len());
    for (name, field) in row.get_column_iter() {
        let kind = fields
            .iter()
            .find(|f| f.name == *name)
            .map(|f| f.kind)
            .ok_or_else(|| LoaderError::SchemaMismatch {
                message: format!("row {row_num} has unknown column '{name}'"),
            })?;
        record.push(name.as_str(), convert_parquet_field(row_num, name, kind, field)?);
    }
    Ok(record)
}

fn convert_parquet_field(row: usize, column: &str, kind: SemanticKind, f: &Field) -> LoaderResult<Value> {
    let bad = |message: &str| LoaderError::SchemaMismatch {
        message: format!("row {row} column '{column}': {message} (raw={f})"),
    };

    let value = match f {
        Field::Null => Value::Null,
        Field::Bool(b) => Value::Boolean(*b),
        Field::Byte(v) => Value::Int8(*v),
        Field::Short(v) => Value::Int16(*v),
        Field::Int(v) => Value::Int32(*v),
        Field::Long(v) => Value::Int64(*v),
        Field::UByte(v) => Value::Int16(i16::from(*v)),
        Field::UShort(v) => Value::Int32(i32::from(*v)),
        Field::UInt(v) => Value::Int64(i64::from(*v)),
        Field::ULong(v) => Value::Decimal(Decimal::from(*v)),
        Field::Float16(v) => Value::Float32(v.to_f32()),
        Field::Float(v) => Value::Float32(*v),
        Field::Double(v) => Value::Float64(*v),
        Field::Decimal(d) => Value::Decimal(decimal_from_parquet(d).ok_or_else(|| bad("decimal out of range"))?),
        Field::Str(s) => Value::String(s.clone()),
        Field::Bytes(b) if kind == SemanticKind::Uuid => {
            Value::Uuid(Uuid::from_slice(b.data()).map_err(|e| bad(&e.to_string()))?)
        }
        Field::Bytes(b) => Value::Bytes(b.data().to_vec()),
        Field::Date(days) => Value::DateTime(
            DateTime::from_timestamp(i64::from(*days) * 86_400, 0)
                .ok_or_else(|| bad("date out of range"))?
                .naive_utc(),
        ),
        Field::TimestampMillis(ms) => Value::DateTime(
            DateTime::from_timestamp_millis(*ms)
                .ok_or_else(|| bad("timestamp out of range"))?
                .naive_utc(),
        ),
        Field::TimestampMicros(us) => Value::DateTime(
            DateTime::from_timestamp_micros(*us)
                .ok_or_else(|| bad("timestamp out of range"))?
                .naive_utc(),
        ),
        Field::TimeMillis(ms) => Value::Time(time_of_day(i64::from(*ms) * 1_000).ok_or_else(|| bad("time out of range"))?),
        Field::TimeMicros(us) => Value::Time(time_of_day(*us).ok_or_else(|| bad("time out of range"))?),
        nested => Value::Nested(nested.to_json_value()),
    };
    Ok(value)
}

fn time_of_day(micros: i64) -> Option<NaiveTime> {
    let secs = u32::try_from(micros.div_euclid(1_000_000)).ok()?;
    let nanos = u32::try_from(micros.rem_euclid(1_000_000) * 1_000).ok()?;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
}

/// Big-endian two's complement unscaled value plus scale.
fn decimal_from_parquet(d: &parquet::data_type::Decimal) -> Option<Decimal> {
    let bytes = d.data();
    if bytes.is_empty() || bytes.len() > 16 {
        return None;
    }
    let fill = if bytes[0] & 0x80 != 0 { 0xFF } else { 0x00 };
    let mut buf = [fill; 16];
    buf[16 - bytes.len()..].copy_from_slice(bytes);
    let scale = u32::try_from(d.scale()).ok()?;
    Decimal::try_from_i128_with_scale(i128::from_be_bytes(buf), scale).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parquet::schema::parser::parse_message_type;

    fn field_kinds(message: &str) -> Vec<(String, SemanticKind, bool)> {
        let schema = parse_message_type(message).unwrap();
        schema
            .get_fields()
            .iter()
            .map(|t| (t.name().to_string(), kind_for(t), is_required(t)))
            .collect()
    }

    #[test]
    fn maps_physical_and_logical_types() {
        let kinds = field_kinds(
            r#"
            message schema {
              REQUIRED INT64 id;
              OPTIONAL BINARY name (UTF8);
              OPTIONAL BINARY payload;
              REQUIRED INT32 small (INT_16);
              OPTIONAL INT32 born (DATE);
              OPTIONAL INT64 seen (TIMESTAMP_MILLIS);
              OPTIONAL INT64 price (DECIMAL(18,2));
              OPTIONAL DOUBLE score;
              OPTIONAL BOOLEAN active;
              OPTIONAL GROUP address {
                OPTIONAL BINARY city (UTF8);
              }
            }
            "#,
        );
        let expected = vec![
            ("id", SemanticKind::Int64, true),
            ("name", SemanticKind::String, false),
            ("payload", SemanticKind::Bytes, false),
            ("small", SemanticKind::Int16, true),
            ("born", SemanticKind::DateTime, false),
            ("seen", SemanticKind::DateTime, false),
            ("price", SemanticKind::Decimal, false),
            ("score", SemanticKind::Float64, false),
            ("active", SemanticKind::Boolean, false),
            ("address", SemanticKind::Nested, false),
        ];
        let expected: Vec<_> = expected
            .into_iter()
            .map(|(n, k, r)| (n.to_string(), k, r))
            .collect();
        assert_eq!(kinds, expected);
    }

    #[test]
    fn decimals_keep_sign_and_scale() {
        use parquet::data_type::Decimal as PqDecimal;

        let d = PqDecimal::from_i64(-12345, 10, 2);
        assert_eq!(decimal_from_parquet(&d), Some(Decimal::new(-12345, 2)));
        let d = PqDecimal::from_bytes(vec![0x01, 0x00].into(), 5, 1);
        assert_eq!(decimal_from_parquet(&d), Some(Decimal::new(256, 1)));
    }

    #[test]
    fn time_of_day_from_micros() {
        assert_eq!(time_of_day(3_600_000_001), NaiveTime::from_hms_micro_opt(1, 0, 0, 1));
        assert_eq!(time_of_day(-1), None);
    }
}
