//! Value representations on both sides of the conversion.
//!
//! [`RawValue`] is what a source driver hands over, in whatever native
//! representation it decoded. [`SpannerValue`] is the typed result of
//! converting one cell to its target column type.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An untyped cell as received from the source.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeTz(DateTime<Utc>),
}

impl RawValue {
    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }

    /// Stringified form kept in bad-row samples.
    pub fn to_sample_string(&self) -> String {
        match self {
            RawValue::Null => "NULL".to_string(),
            RawValue::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Null => f.write_str("NULL"),
            RawValue::Bool(v) => write!(f, "{}", v),
            RawValue::Int(v) => write!(f, "{}", v),
            RawValue::Float(v) => write!(f, "{}", v),
            RawValue::Decimal(v) => write!(f, "{}", v),
            RawValue::Text(v) => f.write_str(v),
            RawValue::Bytes(v) => write!(f, "\\x{}", hex::encode(v)),
            RawValue::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            RawValue::Time(v) => write!(f, "{}", v.format("%H:%M:%S%.f")),
            RawValue::DateTime(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%.f")),
            RawValue::DateTimeTz(v) => write!(f, "{}", v.to_rfc3339()),
        }
    }
}

impl From<i64> for RawValue {
    fn from(v: i64) -> Self {
        RawValue::Int(v)
    }
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        RawValue::Float(v)
    }
}

impl From<bool> for RawValue {
    fn from(v: bool) -> Self {
        RawValue::Bool(v)
    }
}

impl From<&str> for RawValue {
    fn from(v: &str) -> Self {
        RawValue::Text(v.to_string())
    }
}

impl From<String> for RawValue {
    fn from(v: String) -> Self {
        RawValue::Text(v)
    }
}

impl<T: Into<RawValue>> From<Option<T>> for RawValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(RawValue::Null)
    }
}

/// A converted cell, typed for its target column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "UPPERCASE")]
pub enum SpannerValue {
    Bool(bool),
    Int64(i64),
    Float64(f64),
    Numeric(Decimal),
    String(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Array(Vec<Option<SpannerValue>>),
}

impl SpannerValue {
    /// Plain JSON rendering used by row sinks.
    ///
    /// NUMERIC is rendered as a string to keep every digit; BYTES as hex.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            SpannerValue::Bool(v) => Value::Bool(*v),
            SpannerValue::Int64(v) => Value::from(*v),
            SpannerValue::Float64(v) => serde_json::Number::from_f64(*v)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(v.to_string())),
            SpannerValue::Numeric(v) => Value::String(v.to_string()),
            SpannerValue::String(v) => Value::String(v.clone()),
            SpannerValue::Bytes(v) => Value::String(hex::encode(v)),
            SpannerValue::Date(v) => Value::String(v.format("%Y-%m-%d").to_string()),
            SpannerValue::Timestamp(v) => Value::String(v.to_rfc3339()),
            SpannerValue::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| item.as_ref().map(|v| v.to_json()).unwrap_or(Value::Null))
                    .collect(),
            ),
        }
    }
}

/// A source row, or the reason it could not be decoded.
pub type SourceRow = std::result::Result<Vec<RawValue>, String>;

/// A batch of rows streamed from one source table.
#[derive(Debug, Clone)]
pub struct RowBatch {
    /// Column names, in the order values appear in each row.
    pub columns: Arc<Vec<String>>,

    /// Rows in this batch (owned for channel transfer).
    pub rows: Vec<SourceRow>,

    /// Whether this is the final batch for the table.
    pub is_last: bool,
}

impl RowBatch {
    /// Create a new batch with the given rows.
    pub fn new(columns: Arc<Vec<String>>, rows: Vec<SourceRow>) -> Self {
        Self {
            columns,
            rows,
            is_last: false,
        }
    }

    /// Create an empty final batch.
    pub fn empty_final(columns: Arc<Vec<String>>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
            is_last: true,
        }
    }

    /// Mark this as the final batch.
    pub fn mark_final(mut self) -> Self {
        self.is_last = true;
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
