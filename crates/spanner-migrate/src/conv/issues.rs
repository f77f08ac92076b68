//! Per-column conversion issues.

use serde::{Deserialize, Serialize};

/// How much an issue matters when rating a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Note,
}

/// A recorded caveat about how one source column converts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaIssue {
    DefaultValue,
    AutoIncrement,
    MultiDimensionalArray,
    NoGoodType,
    Numeric,
    Decimal,
    Serial,
    Timestamp,
    Datetime,
    Time,
    Widened,
    PrecisionLoss,
    Unique,
    ForeignKey,
    Check,
}

impl SchemaIssue {
    /// Short human-readable description.
    pub fn brief(&self) -> &'static str {
        match self {
            SchemaIssue::DefaultValue => "Default value is not carried over",
            SchemaIssue::AutoIncrement => "Auto-increment is not carried over",
            SchemaIssue::MultiDimensionalArray => {
                "Multi-dimensional arrays are unsupported; stored as STRING"
            }
            SchemaIssue::NoGoodType => "No good type mapping; stored as STRING",
            SchemaIssue::Numeric => "Values may exceed NUMERIC precision 38 or scale 9",
            SchemaIssue::Decimal => "Decimal values may lose precision",
            SchemaIssue::Serial => "Serial sequence is not carried over",
            SchemaIssue::Timestamp => "Timestamp without time zone is read at the configured offset",
            SchemaIssue::Datetime => "Datetime is read at the configured offset",
            SchemaIssue::Time => "Time of day is stored as STRING",
            SchemaIssue::Widened => "Values are stored in a wider type",
            SchemaIssue::PrecisionLoss => "Values may lose precision or range",
            SchemaIssue::Unique => "Unique constraint is advisory and not enforced",
            SchemaIssue::ForeignKey => "Foreign key is not carried over",
            SchemaIssue::Check => "Check constraint is not carried over",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            SchemaIssue::Widened
            | SchemaIssue::Serial
            | SchemaIssue::Unique
            | SchemaIssue::ForeignKey => Severity::Note,
            _ => Severity::Warning,
        }
    }

    pub fn is_warning(&self) -> bool {
        self.severity() == Severity::Warning
    }

    /// Issues that depend on source constraints rather than the chosen type.
    ///
    /// These survive a retype; everything else is recomputed by the mapper.
    pub fn is_type_independent(&self) -> bool {
        matches!(
            self,
            SchemaIssue::DefaultValue
                | SchemaIssue::AutoIncrement
                | SchemaIssue::MultiDimensionalArray
                | SchemaIssue::Unique
                | SchemaIssue::ForeignKey
                | SchemaIssue::Check
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_split() {
        assert!(SchemaIssue::PrecisionLoss.is_warning());
        assert!(SchemaIssue::DefaultValue.is_warning());
        assert!(!SchemaIssue::Widened.is_warning());
        assert!(!SchemaIssue::Unique.is_warning());
    }

    #[test]
    fn test_type_independent() {
        assert!(SchemaIssue::AutoIncrement.is_type_independent());
        assert!(SchemaIssue::MultiDimensionalArray.is_type_independent());
        assert!(!SchemaIssue::Widened.is_type_independent());
    }
}
