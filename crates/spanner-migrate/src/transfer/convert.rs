//! Value and row conversion into target column types.
//!
//! Each target family accepts a fixed set of received representations:
//! the matching native type first, then numeric widening or narrowing, then
//! a round trip through text. Anything else fails for that value only.

use std::str::FromStr;

use chrono::{
    DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc,
};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use crate::conv::Conv;
use crate::core::value::{RawValue, SpannerValue};
use crate::ddl::{SpannerType, TypeFamily};

/// Why a value or row could not be converted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ConversionError(pub String);

impl ConversionError {
    fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    fn unsupported(value: &RawValue, family: TypeFamily) -> Self {
        Self(format!("can't convert {:?} to {}", value, family))
    }
}

type ConvResult<T> = std::result::Result<T, ConversionError>;

/// A converted row, addressed by target names.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedRow {
    pub table: String,
    pub columns: Vec<String>,
    pub values: Vec<SpannerValue>,
}

/// Convert one non-null value to a target type.
///
/// `offset` is applied to date-times that carry no zone.
pub fn convert_value(value: &RawValue, t: &SpannerType, offset: FixedOffset) -> ConvResult<SpannerValue> {
    if value.is_null() {
        return Err(ConversionError::new("unexpected NULL"));
    }
    if !t.is_array {
        return convert_scalar(value, t.family, offset);
    }

    let literal = match value {
        RawValue::Text(s) => s.as_str(),
        RawValue::Bytes(b) => std::str::from_utf8(b)
            .map_err(|_| ConversionError::new("array literal is not valid UTF-8"))?,
        other => {
            return Err(ConversionError::new(format!(
                "can't convert {:?} to an array",
                other
            )))
        }
    };

    let items = parse_array_literal(literal)?
        .into_iter()
        .map(|item| match item {
            None => Ok(None),
            Some(text) => convert_scalar(&RawValue::Text(text), t.family, offset).map(Some),
        })
        .collect::<ConvResult<Vec<_>>>()?;
    Ok(SpannerValue::Array(items))
}

fn convert_scalar(value: &RawValue, family: TypeFamily, offset: FixedOffset) -> ConvResult<SpannerValue> {
    if let RawValue::Bytes(b) = value {
        // Text-protocol drivers hand most values over as bytes.
        if !matches!(family, TypeFamily::Bytes) {
            let text = std::str::from_utf8(b)
                .map_err(|_| ConversionError::new(format!("invalid UTF-8 for {}", family)))?;
            return convert_scalar(&RawValue::Text(text.to_string()), family, offset);
        }
    }

    match family {
        TypeFamily::Bool => to_bool(value).map(SpannerValue::Bool),
        TypeFamily::Bytes => to_bytes(value).map(SpannerValue::Bytes),
        TypeFamily::Date => to_date(value).map(SpannerValue::Date),
        TypeFamily::Float64 => to_float(value).map(SpannerValue::Float64),
        TypeFamily::Int64 => to_int(value).map(SpannerValue::Int64),
        TypeFamily::Numeric => to_numeric(value).map(SpannerValue::Numeric),
        TypeFamily::String => to_string(value).map(SpannerValue::String),
        TypeFamily::Timestamp => to_timestamp(value, offset).map(SpannerValue::Timestamp),
    }
}

fn to_bool(value: &RawValue) -> ConvResult<bool> {
    match value {
        RawValue::Bool(v) => Ok(*v),
        RawValue::Int(v) => Ok(*v != 0),
        RawValue::Text(s) => match s.trim().to_lowercase().as_str() {
            "t" | "true" | "y" | "yes" | "on" | "1" => Ok(true),
            "f" | "false" | "n" | "no" | "off" | "0" => Ok(false),
            _ => Err(ConversionError::new(format!("can't convert {:?} to BOOL", s))),
        },
        other => Err(ConversionError::unsupported(other, TypeFamily::Bool)),
    }
}

fn to_bytes(value: &RawValue) -> ConvResult<Vec<u8>> {
    match value {
        RawValue::Bytes(b) => Ok(b.clone()),
        RawValue::Text(s) => match s.strip_prefix("\\x") {
            Some(digits) => hex::decode(digits)
                .map_err(|e| ConversionError::new(format!("bad hex bytes: {}", e))),
            None => Ok(s.as_bytes().to_vec()),
        },
        other => Err(ConversionError::unsupported(other, TypeFamily::Bytes)),
    }
}

fn to_date(value: &RawValue) -> ConvResult<NaiveDate> {
    match value {
        RawValue::Date(d) => Ok(*d),
        RawValue::DateTime(dt) => Ok(dt.date()),
        RawValue::DateTimeTz(dt) => Ok(dt.date_naive()),
        RawValue::Text(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map_err(|e| ConversionError::new(format!("can't parse {:?} as DATE: {}", s, e))),
        other => Err(ConversionError::unsupported(other, TypeFamily::Date)),
    }
}

fn to_float(value: &RawValue) -> ConvResult<f64> {
    match value {
        RawValue::Float(v) => Ok(*v),
        RawValue::Int(v) => Ok(*v as f64),
        RawValue::Decimal(d) => d
            .to_f64()
            .ok_or_else(|| ConversionError::new(format!("{} is out of FLOAT64 range", d))),
        RawValue::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| ConversionError::new(format!("can't parse {:?} as FLOAT64: {}", s, e))),
        other => Err(ConversionError::unsupported(other, TypeFamily::Float64)),
    }
}

fn to_int(value: &RawValue) -> ConvResult<i64> {
    match value {
        RawValue::Int(v) => Ok(*v),
        RawValue::Bool(v) => Ok(i64::from(*v)),
        RawValue::Float(v) => {
            let truncated = v.trunc();
            if !v.is_finite() || truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
                return Err(ConversionError::new(format!("{} is out of INT64 range", v)));
            }
            Ok(truncated as i64)
        }
        RawValue::Decimal(d) => d
            .trunc()
            .to_i64()
            .ok_or_else(|| ConversionError::new(format!("{} is out of INT64 range", d))),
        RawValue::Text(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| ConversionError::new(format!("can't parse {:?} as INT64: {}", s, e))),
        other => Err(ConversionError::unsupported(other, TypeFamily::Int64)),
    }
}

fn to_numeric(value: &RawValue) -> ConvResult<Decimal> {
    match value {
        RawValue::Decimal(d) => Ok(*d),
        RawValue::Int(v) => Ok(Decimal::from(*v)),
        RawValue::Float(v) => Decimal::from_f64(*v)
            .ok_or_else(|| ConversionError::new(format!("{} is not a valid NUMERIC", v))),
        RawValue::Text(s) => {
            let s = s.trim();
            Decimal::from_str(s)
                .or_else(|_| Decimal::from_scientific(s))
                .map_err(|e| ConversionError::new(format!("can't parse {:?} as NUMERIC: {}", s, e)))
        }
        other => Err(ConversionError::unsupported(other, TypeFamily::Numeric)),
    }
}

fn to_string(value: &RawValue) -> ConvResult<String> {
    match value {
        RawValue::Text(s) => Ok(s.clone()),
        RawValue::Bytes(b) => String::from_utf8(b.clone())
            .map_err(|_| ConversionError::new("invalid UTF-8 for STRING")),
        RawValue::Null => Err(ConversionError::unsupported(value, TypeFamily::String)),
        other => Ok(other.to_string()),
    }
}

fn to_timestamp(value: &RawValue, offset: FixedOffset) -> ConvResult<DateTime<Utc>> {
    match value {
        RawValue::DateTimeTz(dt) => Ok(*dt),
        RawValue::DateTime(dt) => at_offset(dt, offset),
        RawValue::Date(d) => at_offset(&d.and_time(NaiveTime::MIN), offset),
        RawValue::Text(s) => parse_timestamp(s.trim(), offset),
        other => Err(ConversionError::unsupported(other, TypeFamily::Timestamp)),
    }
}

fn at_offset(dt: &NaiveDateTime, offset: FixedOffset) -> ConvResult<DateTime<Utc>> {
    offset
        .from_local_datetime(dt)
        .single()
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| ConversionError::new(format!("{} is not a valid local time", dt)))
}

fn parse_timestamp(s: &str, offset: FixedOffset) -> ConvResult<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Ok(dt.with_timezone(&Utc));
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return at_offset(&dt, offset);
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return at_offset(&d.and_time(NaiveTime::MIN), offset);
    }
    Err(ConversionError::new(format!("can't parse {:?} as TIMESTAMP", s)))
}

/// Parse a one-dimensional PostgreSQL array literal.
///
/// `{a,"b c",NULL}` yields `[Some("a"), Some("b c"), None]`. Quoted elements
/// may contain commas, braces and backslash escapes; a quoted `"NULL"` is
/// the string `NULL`.
pub fn parse_array_literal(literal: &str) -> ConvResult<Vec<Option<String>>> {
    let inner = literal
        .trim()
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .ok_or_else(|| ConversionError::new(format!("{:?} is not an array literal", literal)))?;

    let mut items = Vec::new();
    if inner.trim().is_empty() {
        return Ok(items);
    }

    let mut chars = inner.chars().peekable();
    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }

        let mut item = String::new();
        let quoted = chars.peek() == Some(&'"');
        if quoted {
            chars.next();
            loop {
                match chars.next() {
                    Some('\\') => match chars.next() {
                        Some(c) => item.push(c),
                        None => return Err(ConversionError::new("unterminated escape in array")),
                    },
                    Some('"') => break,
                    Some(c) => item.push(c),
                    None => return Err(ConversionError::new("unterminated quote in array")),
                }
            }
            while chars.peek().is_some_and(|c| c.is_whitespace()) {
                chars.next();
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == ',' {
                    break;
                }
                chars.next();
                match c {
                    '{' | '}' => {
                        return Err(ConversionError::new(
                            "multi-dimensional arrays are not supported",
                        ))
                    }
                    '\\' => match chars.next() {
                        Some(escaped) => item.push(escaped),
                        None => return Err(ConversionError::new("unterminated escape in array")),
                    },
                    _ => item.push(c),
                }
            }
            item = item.trim().to_string();
        }

        if !quoted && item.eq_ignore_ascii_case("NULL") {
            items.push(None);
        } else {
            items.push(Some(item));
        }

        match chars.next() {
            Some(',') => continue,
            None => break,
            Some(c) => {
                return Err(ConversionError::new(format!(
                    "unexpected {:?} after array element",
                    c
                )))
            }
        }
    }
    Ok(items)
}

/// Converts rows of one source table using a read-only view of the model.
pub struct TableConverter<'a> {
    sp_table: &'a str,
    src_cols: Vec<String>,
    /// Target column and type per source column; `None` for removed columns.
    targets: Vec<Option<(&'a str, &'a SpannerType)>>,
    synthetic: Option<&'a str>,
    offset: FixedOffset,
}

impl<'a> TableConverter<'a> {
    /// Resolve the target columns for `src_cols` of `src_table`.
    ///
    /// Fails when the table or one of the columns is unknown to the model;
    /// columns removed by an edit are skipped.
    pub fn new(conv: &'a Conv, src_table: &str, src_cols: &[String]) -> ConvResult<Self> {
        let sp_table = conv
            .relation
            .spanner_table(src_table)
            .ok_or_else(|| ConversionError::new(format!("table {} is not in the schema", src_table)))?;
        let sp = conv
            .sp_schema
            .get(sp_table)
            .ok_or_else(|| ConversionError::new(format!("target table {} is missing", sp_table)))?;
        let src = conv
            .src_schema
            .get(src_table)
            .ok_or_else(|| ConversionError::new(format!("source table {} is missing", src_table)))?;

        let mut targets = Vec::with_capacity(src_cols.len());
        for col in src_cols {
            if !src.col_defs.contains_key(col) {
                return Err(ConversionError::new(format!(
                    "column {} of {} is not in the source schema",
                    col, src_table
                )));
            }
            match conv.relation.spanner_column(src_table, col) {
                Some(sp_col) => {
                    let def = sp.col_defs.get(sp_col).ok_or_else(|| {
                        ConversionError::new(format!("target column {}.{} is missing", sp_table, sp_col))
                    })?;
                    targets.push(Some((def.name.as_str(), &def.t)));
                }
                None => targets.push(None),
            }
        }

        let offset = FixedOffset::east_opt(conv.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix());

        Ok(Self {
            sp_table,
            src_cols: src_cols.to_vec(),
            targets,
            synthetic: conv.synthetic_pkeys.get(sp_table).map(|k| k.col.as_str()),
            offset,
        })
    }

    pub fn sp_table(&self) -> &str {
        self.sp_table
    }

    /// Convert one row. Nulls are omitted from the output.
    ///
    /// The synthetic key, when the table has one, gets the bit-reversed value
    /// of `seq`, which is then advanced. A failed row leaves `seq` unchanged.
    pub fn convert(&self, values: &[RawValue], seq: &mut i64) -> ConvResult<ConvertedRow> {
        if values.len() != self.targets.len() {
            return Err(ConversionError::new(format!(
                "row has {} values for {} columns",
                values.len(),
                self.targets.len()
            )));
        }

        let mut columns = Vec::with_capacity(values.len() + 1);
        let mut out = Vec::with_capacity(values.len() + 1);
        for (i, value) in values.iter().enumerate() {
            let Some((sp_col, t)) = self.targets[i] else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            let converted = convert_value(value, t, self.offset).map_err(|e| {
                ConversionError::new(format!("column {}: {}", self.src_cols[i], e))
            })?;
            columns.push(sp_col.to_string());
            out.push(converted);
        }

        if let Some(col) = self.synthetic {
            columns.push(col.to_string());
            out.push(SpannerValue::Int64(bit_reverse(*seq)));
            *seq += 1;
        }

        Ok(ConvertedRow {
            table: self.sp_table.to_string(),
            columns,
            values: out,
        })
    }
}

/// Reverse the bits of a sequence value so consecutive keys spread out.
pub fn bit_reverse(seq: i64) -> i64 {
    (seq as u64).reverse_bits() as i64
}
