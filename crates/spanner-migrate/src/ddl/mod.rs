//! Target (Spanner) schema types.
//!
//! These mirror the source-side types in [`crate::core::schema`] but carry
//! target names and target types. A [`CreateTable`] is derived from a source
//! table during schema construction and then mutated by interleaving and the
//! edit protocol.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MigrateError;

/// Largest bounded STRING/BYTES length Spanner accepts.
pub const MAX_BOUNDED_LENGTH: i64 = 2_621_440;

/// Maximum NUMERIC precision supported by the target.
pub const NUMERIC_MAX_PRECISION: u32 = 38;

/// Maximum NUMERIC scale supported by the target.
pub const NUMERIC_MAX_SCALE: u32 = 9;

/// Primitive target type families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TypeFamily {
    Bool,
    Bytes,
    Date,
    Float64,
    Int64,
    Numeric,
    String,
    Timestamp,
}

impl TypeFamily {
    /// All families, in catalog order.
    pub const ALL: [TypeFamily; 8] = [
        TypeFamily::Bool,
        TypeFamily::Bytes,
        TypeFamily::Date,
        TypeFamily::Float64,
        TypeFamily::Int64,
        TypeFamily::Numeric,
        TypeFamily::String,
        TypeFamily::Timestamp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TypeFamily::Bool => "BOOL",
            TypeFamily::Bytes => "BYTES",
            TypeFamily::Date => "DATE",
            TypeFamily::Float64 => "FLOAT64",
            TypeFamily::Int64 => "INT64",
            TypeFamily::Numeric => "NUMERIC",
            TypeFamily::String => "STRING",
            TypeFamily::Timestamp => "TIMESTAMP",
        }
    }

    /// Whether this family takes a length modifier.
    pub fn is_length_bounded(&self) -> bool {
        matches!(self, TypeFamily::String | TypeFamily::Bytes)
    }
}

impl fmt::Display for TypeFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TypeFamily {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BOOL" | "BOOLEAN" => Ok(TypeFamily::Bool),
            "BYTES" => Ok(TypeFamily::Bytes),
            "DATE" => Ok(TypeFamily::Date),
            "FLOAT64" => Ok(TypeFamily::Float64),
            "INT64" => Ok(TypeFamily::Int64),
            "NUMERIC" => Ok(TypeFamily::Numeric),
            "STRING" => Ok(TypeFamily::String),
            "TIMESTAMP" => Ok(TypeFamily::Timestamp),
            other => Err(MigrateError::Config(format!(
                "Unknown target type '{}'. Valid types: BOOL, BYTES, DATE, FLOAT64, INT64, NUMERIC, STRING, TIMESTAMP",
                other
            ))),
        }
    }
}

/// Length modifier for STRING and BYTES.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Length {
    Max,
    Bounded(i64),
}

/// A target column type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpannerType {
    pub family: TypeFamily,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub len: Option<Length>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
    #[serde(default)]
    pub is_array: bool,
}

impl SpannerType {
    /// A scalar type with no modifiers. STRING and BYTES default to MAX.
    pub fn new(family: TypeFamily) -> Self {
        let len = family.is_length_bounded().then_some(Length::Max);
        Self {
            family,
            len,
            precision: None,
            scale: None,
            is_array: false,
        }
    }

    pub fn string_max() -> Self {
        Self::new(TypeFamily::String)
    }

    /// STRING/BYTES with a length taken from a source modifier.
    ///
    /// Lengths the target cannot bound fall back to MAX.
    pub fn with_length(family: TypeFamily, len: Option<i64>) -> Self {
        let mut t = Self::new(family);
        if family.is_length_bounded() {
            t.len = Some(match len {
                Some(n) if n > 0 && n <= MAX_BOUNDED_LENGTH => Length::Bounded(n),
                _ => Length::Max,
            });
        }
        t
    }

    pub fn numeric(precision: Option<u32>, scale: Option<u32>) -> Self {
        Self {
            precision,
            scale,
            ..Self::new(TypeFamily::Numeric)
        }
    }

    /// Turn this type into an array of itself.
    pub fn into_array(mut self) -> Self {
        self.is_array = true;
        self
    }

    fn scalar_name(&self) -> String {
        match (self.family, self.len, self.precision, self.scale) {
            (_, Some(Length::Max), _, _) => format!("{}(MAX)", self.family),
            (_, Some(Length::Bounded(n)), _, _) => format!("{}({})", self.family, n),
            (TypeFamily::Numeric, _, Some(p), Some(s)) => format!("NUMERIC({},{})", p, s),
            (TypeFamily::Numeric, _, Some(p), None) => format!("NUMERIC({})", p),
            _ => self.family.to_string(),
        }
    }
}

impl fmt::Display for SpannerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_array {
            write!(f, "ARRAY<{}>", self.scalar_name())
        } else {
            f.write_str(&self.scalar_name())
        }
    }
}

/// A target column definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub t: SpannerType,
    pub not_null: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// One entry of a primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexKey {
    pub col: String,
    #[serde(default)]
    pub desc: bool,
}

impl IndexKey {
    pub fn asc(col: impl Into<String>) -> Self {
        Self {
            col: col.into(),
            desc: false,
        }
    }
}

/// A target foreign key, in target names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Foreignkey {
    #[serde(default)]
    pub name: String,
    pub columns: Vec<String>,
    pub refer_table: String,
    pub refer_columns: Vec<String>,
}

/// A target table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTable {
    pub name: String,
    /// Physical column order.
    pub col_names: Vec<String>,
    pub col_defs: BTreeMap<String, ColumnDef>,
    /// Primary key in key order.
    pub pks: Vec<IndexKey>,
    /// Interleave parent; `None` means not interleaved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default)]
    pub fks: Vec<Foreignkey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl CreateTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            col_names: Vec::new(),
            col_defs: BTreeMap::new(),
            pks: Vec::new(),
            parent: None,
            fks: Vec::new(),
            comment: None,
        }
    }

    /// Primary key column names in key order.
    pub fn pk_columns(&self) -> Vec<&str> {
        self.pks.iter().map(|k| k.col.as_str()).collect()
    }

    pub fn has_pk_column(&self, col: &str) -> bool {
        self.pks.iter().any(|k| k.col == col)
    }

    pub fn is_interleaved(&self) -> bool {
        self.parent.is_some()
    }
}
