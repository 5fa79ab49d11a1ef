//! Value encoder: typed source values to SQL literal text.
//!
//! Every literal produced here can be dropped straight into an `INSERT ... VALUES` tuple:
//!
//! - `NULL` is unquoted
//! - text is single-quoted with embedded quotes doubled
//! - blobs are `x'<uppercase hex>'`
//! - numbers are culture-invariant decimal text
//!
//! Fractional values narrowed to [`StorageClass::Integer`] round half away from zero.

use std::borrow::Cow;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Timelike, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{LoaderError, LoaderResult};
use crate::types::{Column, Interpretation, LocaleSettings, StorageClass, Value};

/// The unquoted null literal.
pub const NULL: &str = "NULL";

/// Prefix that marks a string as base64 regardless of interpretation flags.
pub const BASE64_PREFIX: &str = "base64:";

/// Encodes [`Value`]s as SQL literals.
///
/// Date/time values written to integer or numeric columns become the whole number of seconds
/// between the value and the encoder's reference instant, which is captured when the encoder is
/// built (once per job).
#[derive(Debug, Clone)]
pub struct ValueEncoder {
    reference_time: NaiveDateTime,
    locale: LocaleSettings,
}

impl Default for ValueEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueEncoder {
    /// Create an encoder referenced to the current instant with default locale settings.
    pub fn new() -> Self {
        Self {
            reference_time: Utc::now().naive_utc(),
            locale: LocaleSettings::default(),
        }
    }

    /// Override the reference instant (UTC) used for date/time to number conversion.
    pub fn with_reference_time(mut self, reference_time: NaiveDateTime) -> Self {
        self.reference_time = reference_time;
        self
    }

    /// Override the locale rules used by `STRIP_ALPHA` and `LOCAL_DATE`.
    pub fn with_locale(mut self, locale: LocaleSettings) -> Self {
        self.locale = locale;
        self
    }

    pub fn reference_time(&self) -> NaiveDateTime {
        self.reference_time
    }

    /// Encode `value` for `column`, using its storage class and interpretation flags.
    pub fn encode_column(&self, value: &Value, column: &Column) -> LoaderResult<String> {
        self.encode(
            &column.name,
            value,
            column.storage_class,
            column.interpretation,
        )
    }

    /// Encode `value` as a literal of storage class `class`.
    ///
    /// `column` is only used for error context.
    pub fn encode(
        &self,
        column: &str,
        value: &Value,
        class: StorageClass,
        flags: Interpretation,
    ) -> LoaderResult<String> {
        let unsupported = || LoaderError::TypeConversionUnsupported {
            column: column.to_string(),
            kind: value.kind(),
            class,
        };

        match value {
            Value::Null => Ok(NULL.to_string()),
            Value::Boolean(b) => match class {
                StorageClass::Integer | StorageClass::Real | StorageClass::Numeric => {
                    Ok(if *b { "1" } else { "0" }.to_string())
                }
                StorageClass::Text => Ok(if *b { "'True'" } else { "'False'" }.to_string()),
                StorageClass::Blob => Err(unsupported()),
            },
            Value::Int8(v) => integral(i64::from(*v), class).ok_or_else(unsupported),
            Value::Int16(v) => integral(i64::from(*v), class).ok_or_else(unsupported),
            Value::Int32(v) => integral(i64::from(*v), class).ok_or_else(unsupported),
            Value::Int64(v) => integral(*v, class).ok_or_else(unsupported),
            Value::Float32(v) => float(v.to_string(), f64::from(*v), class).ok_or_else(unsupported),
            Value::Float64(v) => float(v.to_string(), *v, class).ok_or_else(unsupported),
            Value::Decimal(d) => decimal(*d, class).ok_or_else(unsupported),
            Value::Char(c) => match class {
                StorageClass::Text => Ok(quote(c.encode_utf8(&mut [0; 4]))),
                StorageClass::Integer | StorageClass::Numeric => Ok(u32::from(*c).to_string()),
                _ => Err(unsupported()),
            },
            Value::String(s) => self.encode_string(column, s, class, flags),
            Value::Byte(b) => match class {
                StorageClass::Blob => Ok(blob(&[*b])),
                StorageClass::Integer | StorageClass::Numeric => Ok(b.to_string()),
                _ => Err(unsupported()),
            },
            Value::Bytes(bytes) => match class {
                StorageClass::Blob => Ok(blob(bytes)),
                _ => Err(unsupported()),
            },
            Value::DateTime(dt) => match class {
                StorageClass::Text => Ok(quote(&iso_naive(dt))),
                StorageClass::Integer | StorageClass::Numeric => {
                    Ok(self.seconds_until_reference(*dt).to_string())
                }
                _ => Err(unsupported()),
            },
            Value::DateTimeOffset(dt) => match class {
                StorageClass::Text => Ok(quote(&iso_offset(dt))),
                StorageClass::Integer | StorageClass::Numeric => {
                    Ok(self.seconds_until_reference(dt.naive_utc()).to_string())
                }
                _ => Err(unsupported()),
            },
            Value::Uuid(u) => match class {
                StorageClass::Text => Ok(quote(&u.hyphenated().to_string())),
                _ => Err(unsupported()),
            },
            Value::Nested(doc) => match class {
                StorageClass::Text => Ok(quote(&doc.to_string())),
                _ => Err(unsupported()),
            },
            Value::Time(_) => Err(unsupported()),
        }
    }

    fn encode_string(
        &self,
        column: &str,
        raw: &str,
        class: StorageClass,
        flags: Interpretation,
    ) -> LoaderResult<String> {
        if flags.contains(Interpretation::LITERAL_NULL_IS_NULL) && raw.eq_ignore_ascii_case("null") {
            return Ok(NULL.to_string());
        }
        if flags.contains(Interpretation::EMPTY_STRING_IS_NULL) && raw.is_empty() {
            return Ok(NULL.to_string());
        }

        match class {
            StorageClass::Blob => decode_binary(column, raw, flags).map(|bytes| blob(&bytes)),
            StorageClass::Text | StorageClass::Integer | StorageClass::Real | StorageClass::Numeric => {
                let text: Cow<'_, str> = if flags.contains(Interpretation::STRIP_ALPHA) {
                    Cow::Owned(self.strip_alpha(column, raw)?)
                } else {
                    Cow::Borrowed(raw)
                };

                if flags.contains(Interpretation::LOCAL_DATE) {
                    let dt = self.parse_local_date(column, &text)?;
                    return self.encode(column, &Value::DateTime(dt), class, Interpretation::NONE);
                }

                if class == StorageClass::Text {
                    Ok(quote(&text))
                } else {
                    numeric_text(column, &text)
                }
            }
        }
    }

    /// Keep digits, the decimal separator and `-`, then require a decimal number.
    fn strip_alpha(&self, column: &str, raw: &str) -> LoaderResult<String> {
        let sep = self.locale.decimal_separator;
        let kept: String = raw
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == sep || *c == '-')
            .map(|c| if c == sep { '.' } else { c })
            .collect();

        Decimal::from_str(&kept)
            .map(|d| d.to_string())
            .map_err(|e| LoaderError::AmbiguousStringValue {
                column: column.to_string(),
                raw: raw.to_string(),
                message: format!("stripped value '{kept}' is not a number ({e})"),
            })
    }

    fn parse_local_date(&self, column: &str, raw: &str) -> LoaderResult<NaiveDateTime> {
        let s = raw.trim();
        for fmt in &self.locale.date_formats {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
                return Ok(dt);
            }
            if let Some(dt) = NaiveDate::parse_from_str(s, fmt)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
            {
                return Ok(dt);
            }
        }
        Err(LoaderError::AmbiguousStringValue {
            column: column.to_string(),
            raw: raw.to_string(),
            message: format!(
                "not a date in any configured format {:?}",
                self.locale.date_formats
            ),
        })
    }

    fn seconds_until_reference(&self, value: NaiveDateTime) -> i64 {
        // Relative to the reference instant, not the Unix epoch.
        let elapsed = self.reference_time - value;
        let seconds = elapsed.num_seconds();
        if elapsed.subsec_nanos() < 0 { seconds - 1 } else { seconds }
    }
}

/// Quote text as a SQL string literal, doubling embedded single quotes.
pub fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for c in text.chars() {
        if c == '\'' {
            out.push('\'');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

/// Blob literal `x'<HEX>'`.
pub fn blob(bytes: &[u8]) -> String {
    format!("x'{}'", hex::encode_upper(bytes))
}

// Bounds of i64 as exact floats: -2^63 is representable, 2^63 is one past the maximum.
const I64_LOWER: f64 = -9_223_372_036_854_775_808.0;
const I64_UPPER: f64 = 9_223_372_036_854_775_808.0;

fn integral(v: i64, class: StorageClass) -> Option<String> {
    match class {
        StorageClass::Text => Some(format!("'{v}'")),
        StorageClass::Integer | StorageClass::Real | StorageClass::Numeric => Some(v.to_string()),
        StorageClass::Blob => None,
    }
}

fn float(text: String, v: f64, class: StorageClass) -> Option<String> {
    if class == StorageClass::Blob {
        return None;
    }
    if v.is_nan() {
        return Some(NULL.to_string());
    }
    if v.is_infinite() {
        let lit = match (class, v.is_sign_negative()) {
            (StorageClass::Text, false) => "'inf'",
            (StorageClass::Text, true) => "'-inf'",
            (_, false) => "9e999",
            (_, true) => "-9e999",
        };
        return Some(lit.to_string());
    }
    match class {
        StorageClass::Text => Some(quote(&text)),
        StorageClass::Real | StorageClass::Numeric => Some(text),
        // `f64::round` rounds half away from zero.
        StorageClass::Integer => {
            let rounded = v.round();
            (rounded >= I64_LOWER && rounded < I64_UPPER).then(|| (rounded as i64).to_string())
        }
        StorageClass::Blob => None,
    }
}

fn decimal(d: Decimal, class: StorageClass) -> Option<String> {
    match class {
        StorageClass::Text => Some(quote(&d.to_string())),
        StorageClass::Real | StorageClass::Numeric => Some(d.to_string()),
        StorageClass::Integer => d
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .map(|i| i.to_string()),
        StorageClass::Blob => None,
    }
}

/// Numeric text bound for an INTEGER/REAL/NUMERIC column, validated so that it can be emitted
/// unquoted.
fn numeric_text(column: &str, text: &str) -> LoaderResult<String> {
    let trimmed = text.trim();
    let well_formed = !trimmed.is_empty()
        && trimmed
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
        && trimmed.parse::<f64>().is_ok_and(f64::is_finite);

    if well_formed {
        Ok(trimmed.to_string())
    } else {
        Err(LoaderError::AmbiguousStringValue {
            column: column.to_string(),
            raw: text.to_string(),
            message: "expected numeric text".to_string(),
        })
    }
}

fn decode_binary(column: &str, raw: &str, flags: Interpretation) -> LoaderResult<Vec<u8>> {
    let ambiguous = |message: String| LoaderError::AmbiguousStringValue {
        column: column.to_string(),
        raw: raw.to_string(),
        message,
    };

    if let Some(rest) = raw.strip_prefix(BASE64_PREFIX) {
        return BASE64_STANDARD
            .decode(rest.trim())
            .map_err(|e| ambiguous(format!("invalid base64: {e}")));
    }
    if flags.contains(Interpretation::BASE64) {
        return BASE64_STANDARD
            .decode(raw.trim())
            .map_err(|e| ambiguous(format!("invalid base64: {e}")));
    }
    if flags.contains(Interpretation::HEX) {
        let digits = raw.trim();
        let digits = digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
            .unwrap_or(digits);
        return hex::decode(digits).map_err(|e| ambiguous(format!("invalid hex: {e}")));
    }
    Ok(raw.as_bytes().to_vec())
}

/// ISO-8601 round-trip text with seven fractional digits.
fn iso_naive(dt: &NaiveDateTime) -> String {
    // Leap seconds carry nanosecond values past 1e9.
    let ticks = (dt.nanosecond() % 1_000_000_000) / 100;
    format!("{}.{ticks:07}", dt.format("%Y-%m-%dT%H:%M:%S"))
}

fn iso_offset(dt: &DateTime<FixedOffset>) -> String {
    format!("{}{}", iso_naive(&dt.naive_local()), dt.format("%:z"))
}
