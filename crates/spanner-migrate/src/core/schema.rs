//! Source schema types and raw introspection records.
//!
//! The `*Info` records are what a [`SourceReader`](super::traits::SourceReader)
//! returns from catalog queries. Schema construction turns them into
//! [`SourceTable`]s, which keep the source's names, ordering and constraints
//! exactly as read.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A table as listed by the source catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Source-side table name used throughout the schema model.
    ///
    /// Tables in the dialect's implicit schema (`public` for PostgreSQL, the
    /// connected database for MySQL) keep their bare name; everything else is
    /// qualified as `schema.name`.
    pub fn source_name(&self, implicit_schema: &str) -> String {
        if self.schema.is_empty() || self.schema == implicit_schema {
            self.name.clone()
        } else {
            format!("{}.{}", self.schema, self.name)
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// One column row from the catalog, in ordinal order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    /// Catalog type name. For arrays this may be a generic marker such as `ARRAY`.
    pub type_name: String,
    /// Element type for array columns.
    pub element_type: Option<String>,
    /// Declared array dimensions (0 for scalars).
    pub array_dims: u32,
    /// Raw nullability string as reported by the catalog (`YES`/`NO`).
    pub nullable: String,
    pub has_default: bool,
    pub auto_increment: bool,
    pub char_length: Option<i64>,
    pub numeric_precision: Option<i64>,
    pub numeric_scale: Option<i64>,
}

/// One `(column, constraint kind)` row from the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintInfo {
    pub column: String,
    /// Raw kind label, e.g. `PRIMARY KEY`, `UNIQUE`, `FOREIGN KEY`, `CHECK`.
    pub kind: String,
}

impl ConstraintInfo {
    pub fn new(column: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            kind: kind.into(),
        }
    }
}

/// Constraint kinds recognised by the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    PrimaryKey,
    Unique,
    ForeignKey,
    Check,
}

impl ConstraintKind {
    /// Parse a catalog constraint label.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_uppercase().as_str() {
            "PRIMARY KEY" | "PRIMARY" => Some(ConstraintKind::PrimaryKey),
            "UNIQUE" => Some(ConstraintKind::Unique),
            "FOREIGN KEY" => Some(ConstraintKind::ForeignKey),
            "CHECK" => Some(ConstraintKind::Check),
            _ => None,
        }
    }
}

/// A foreign key as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub ref_table: TableRef,
    pub ref_columns: Vec<String>,
}

/// Source type descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceType {
    /// Type name; the element type name for arrays.
    pub name: String,
    /// Length, or precision and scale.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mods: Vec<i64>,
    /// One entry per array dimension, `-1` when unbounded.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub array_bounds: Vec<i64>,
}

impl SourceType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mods: Vec::new(),
            array_bounds: Vec::new(),
        }
    }

    pub fn with_mods(mut self, mods: Vec<i64>) -> Self {
        self.mods = mods;
        self
    }

    pub fn with_array_dims(mut self, dims: u32) -> Self {
        self.array_bounds = vec![-1; dims as usize];
        self
    }

    /// Build a descriptor from a catalog column row.
    ///
    /// Character length wins over numeric modifiers. Numeric precision with a
    /// non-zero scale carries both; precision alone carries only precision.
    pub fn from_info(info: &ColumnInfo) -> Self {
        let is_array = info.array_dims > 0 || info.type_name.eq_ignore_ascii_case("ARRAY");
        let name = match (&info.element_type, is_array) {
            (Some(elem), true) => elem.clone(),
            _ => info.type_name.clone(),
        };

        let mods = match (info.char_length, info.numeric_precision, info.numeric_scale) {
            (Some(len), _, _) => vec![len],
            (None, Some(p), Some(s)) if s != 0 => vec![p, s],
            (None, Some(p), _) => vec![p],
            _ => Vec::new(),
        };

        let dims = if is_array { info.array_dims.max(1) } else { 0 };
        Self::new(name).with_mods(mods).with_array_dims(dims)
    }

    pub fn is_array(&self) -> bool {
        !self.array_bounds.is_empty()
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.mods.is_empty() {
            let mods: Vec<String> = self.mods.iter().map(|m| m.to_string()).collect();
            write!(f, "({})", mods.join(","))?;
        }
        for bound in &self.array_bounds {
            if *bound < 0 {
                f.write_str("[]")?;
            } else {
                write!(f, "[{}]", bound)?;
            }
        }
        Ok(())
    }
}

/// Source constraints the target schema does not reproduce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ignored {
    #[serde(default)]
    pub foreign_key: bool,
    #[serde(default)]
    pub check: bool,
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub auto_increment: bool,
}

/// A source column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub not_null: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub ignored: Ignored,
}

/// A source foreign key with positional column correspondence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    #[serde(default)]
    pub name: String,
    pub columns: Vec<String>,
    pub ref_table: String,
    pub ref_columns: Vec<String>,
}

/// A source table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTable {
    pub name: String,
    pub schema: String,
    /// Physical column order.
    pub col_names: Vec<String>,
    pub col_defs: BTreeMap<String, SourceColumn>,
    /// Primary key columns in key ordinal order.
    pub primary_keys: Vec<String>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
}

impl SourceTable {
    pub fn column(&self, name: &str) -> Option<&SourceColumn> {
        self.col_defs.get(name)
    }

    pub fn has_primary_key(&self) -> bool {
        !self.primary_keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_info(name: &str, type_name: &str) -> ColumnInfo {
        ColumnInfo {
            name: name.to_string(),
            type_name: type_name.to_string(),
            nullable: "YES".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_source_name_drops_implicit_schema() {
        assert_eq!(TableRef::new("public", "users").source_name("public"), "users");
        assert_eq!(
            TableRef::new("sales", "orders").source_name("public"),
            "sales.orders"
        );
    }

    #[test]
    fn test_from_info_char_length() {
        let mut info = make_info("name", "varchar");
        info.char_length = Some(40);
        let t = SourceType::from_info(&info);
        assert_eq!(t.name, "varchar");
        assert_eq!(t.mods, vec![40]);
        assert!(!t.is_array());
    }

    #[test]
    fn test_from_info_numeric_mods() {
        let mut info = make_info("total", "numeric");
        info.numeric_precision = Some(10);
        info.numeric_scale = Some(2);
        assert_eq!(SourceType::from_info(&info).mods, vec![10, 2]);

        info.numeric_scale = Some(0);
        assert_eq!(SourceType::from_info(&info).mods, vec![10]);
    }

    #[test]
    fn test_from_info_array_uses_element_type() {
        let mut info = make_info("tags", "ARRAY");
        info.element_type = Some("text".to_string());
        let t = SourceType::from_info(&info);
        assert_eq!(t.name, "text");
        assert_eq!(t.array_bounds, vec![-1]);

        info.array_dims = 2;
        assert_eq!(SourceType::from_info(&info).array_bounds, vec![-1, -1]);
    }

    #[test]
    fn test_constraint_kind_parse() {
        assert_eq!(
            ConstraintKind::parse("PRIMARY KEY"),
            Some(ConstraintKind::PrimaryKey)
        );
        assert_eq!(ConstraintKind::parse("unique"), Some(ConstraintKind::Unique));
        assert_eq!(ConstraintKind::parse("EXCLUDE"), None);
    }

    #[test]
    fn test_source_type_display() {
        let t = SourceType::new("int4").with_array_dims(2);
        assert_eq!(t.to_string(), "int4[][]");
        let t = SourceType::new("numeric").with_mods(vec![10, 2]);
        assert_eq!(t.to_string(), "numeric(10,2)");
    }
}
