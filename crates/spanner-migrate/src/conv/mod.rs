//! The schema model shared by every conversion phase.
//!
//! [`Conv`] holds the source schema, the derived target schema, the
//! correspondence between them, per-column issues, synthetic primary keys,
//! and row statistics. It is built once by [`crate::extract::build_schema`],
//! optionally edited through [`crate::edit`], and read by the data pipeline.

mod issues;
mod relation;
mod stats;

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::identifier::unique_name;
use crate::core::schema::{SourceTable, TableRef};
use crate::core::value::RawValue;
use crate::ddl::{ColumnDef, CreateTable, IndexKey, SpannerType, TypeFamily};
use crate::dialect::SourceDialect;
use crate::error::{MigrateError, Result};
use crate::interleave::InterleaveStatus;
use crate::transfer::convert::{ConversionError, ConvertedRow, TableConverter};

pub use issues::{SchemaIssue, Severity};
pub use relation::{Correspondence, NameAndCols};
pub use stats::{
    BadRow, BadRowSample, ConversionStats, SampleLimits, TableStats, DEFAULT_SAMPLE_BYTES,
    DEFAULT_SAMPLE_ROWS,
};

/// Base name for generated primary key columns.
pub const SYNTHETIC_PK_NAME: &str = "synth_id";

/// Generated primary key of a target table whose source had none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntheticPkey {
    pub col: String,
    /// Next pre-reversal value.
    pub sequence: i64,
}

/// A table selected for conversion, in processing order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub table_ref: TableRef,
    /// Source table name as used in the model.
    pub src_name: String,
}

/// Schema rating, from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Rating {
    Gray,
    Green,
    Blue,
    Yellow,
    Red,
}

impl Rating {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rating::Gray => "GRAY",
            Rating::Green => "GREEN",
            Rating::Blue => "BLUE",
            Rating::Yellow => "YELLOW",
            Rating::Red => "RED",
        }
    }
}

impl std::fmt::Display for Rating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rate a table by column count, warnings, and whether it lacks a key.
pub fn rate_schema(cols: i64, warnings: i64, missing_pk: bool) -> Rating {
    let good = warnings < cols / 20;
    let ok = warnings < cols / 3;
    if cols == 0 {
        Rating::Gray
    } else if warnings == 0 {
        if missing_pk {
            Rating::Blue
        } else {
            Rating::Green
        }
    } else if good {
        if missing_pk {
            Rating::Yellow
        } else {
            Rating::Blue
        }
    } else if ok && !missing_pk {
        Rating::Yellow
    } else {
        Rating::Red
    }
}

/// Per-table summary for reports.
#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub src_table: String,
    pub sp_table: String,
    pub columns: i64,
    pub warnings: i64,
    pub notes: i64,
    pub synthetic_pk: bool,
    pub interleaved_in: Option<String>,
    pub rating: Rating,
}

/// The conversion model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conv {
    pub dialect: SourceDialect,
    pub src_schema: BTreeMap<String, SourceTable>,
    pub sp_schema: BTreeMap<String, CreateTable>,
    pub relation: Correspondence,
    /// Source table → source column → issues.
    #[serde(default)]
    pub issues: BTreeMap<String, BTreeMap<String, Vec<SchemaIssue>>>,
    /// Target table → synthetic key.
    #[serde(default)]
    pub synthetic_pkeys: BTreeMap<String, SyntheticPkey>,
    #[serde(default)]
    pub stats: ConversionStats,
    /// Tables in processing order, fixed when the schema is built.
    #[serde(default)]
    pub tables: Vec<TableSnapshot>,
    #[serde(default)]
    pub utc_offset_minutes: i32,
    #[serde(default)]
    pub sample_limits: SampleLimits,
    /// Source table → introspection error for tables left out.
    #[serde(default)]
    pub introspection_errors: BTreeMap<String, String>,
    /// Target table → latest interleaving decision.
    #[serde(default)]
    pub interleave: BTreeMap<String, InterleaveStatus>,
}

impl Conv {
    pub fn new(dialect: SourceDialect) -> Self {
        Self {
            dialect,
            src_schema: BTreeMap::new(),
            sp_schema: BTreeMap::new(),
            relation: Correspondence::new(),
            issues: BTreeMap::new(),
            synthetic_pkeys: BTreeMap::new(),
            stats: ConversionStats::default(),
            tables: Vec::new(),
            utc_offset_minutes: 0,
            sample_limits: SampleLimits::default(),
            introspection_errors: BTreeMap::new(),
            interleave: BTreeMap::new(),
        }
    }

    /// Record unexpected input. Never fails.
    pub fn unexpected(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        warn!("Unexpected input: {}", msg);
        self.stats.record_unexpected(msg);
    }

    /// Attach an issue to a source column, keeping the list free of duplicates.
    pub fn add_issue(&mut self, src_table: &str, src_col: &str, issue: SchemaIssue) {
        let list = self
            .issues
            .entry(src_table.to_string())
            .or_default()
            .entry(src_col.to_string())
            .or_default();
        if !list.contains(&issue) {
            list.push(issue);
        }
    }

    pub fn column_issues(&self, src_table: &str, src_col: &str) -> &[SchemaIssue] {
        self.issues
            .get(src_table)
            .and_then(|cols| cols.get(src_col))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn sp_table(&self, name: &str) -> Result<&CreateTable> {
        self.sp_schema
            .get(name)
            .ok_or_else(|| MigrateError::UnknownTable(name.to_string()))
    }

    /// Give every target table without a primary key a synthetic one.
    ///
    /// Returns the tables that received a key.
    pub fn add_primary_keys(&mut self) -> Vec<String> {
        let mut added = Vec::new();
        for (name, table) in self.sp_schema.iter_mut() {
            if !table.pks.is_empty() {
                continue;
            }
            let col = unique_name(
                SYNTHETIC_PK_NAME,
                table.col_names.iter().map(String::as_str),
            );
            table.col_names.push(col.clone());
            table.col_defs.insert(
                col.clone(),
                ColumnDef {
                    name: col.clone(),
                    t: SpannerType::new(TypeFamily::Int64),
                    not_null: true,
                    comment: None,
                },
            );
            table.pks.push(IndexKey::asc(col.clone()));
            self.synthetic_pkeys
                .insert(name.clone(), SyntheticPkey { col, sequence: 0 });
            added.push(name.clone());
        }
        added
    }

    pub fn is_synthetic_column(&self, sp_table: &str, col: &str) -> bool {
        self.synthetic_pkeys
            .get(sp_table)
            .is_some_and(|k| k.col == col)
    }

    /// Verify the structural invariants of the model.
    pub fn check_invariants(&self) -> Result<()> {
        self.relation.check()?;

        for (src_name, sp_name) in self.relation.tables() {
            let src = self.src_schema.get(src_name).ok_or_else(|| {
                MigrateError::ModelInvariant(format!("{} is linked but not in the source schema", src_name))
            })?;
            let sp = self.sp_schema.get(sp_name).ok_or_else(|| {
                MigrateError::ModelInvariant(format!("{} is linked but not in the target schema", sp_name))
            })?;

            if let Some(cols) = self.relation.spanner_columns(src_name) {
                for (src_col, sp_col) in cols {
                    if !src.col_defs.contains_key(src_col) {
                        return Err(MigrateError::ModelInvariant(format!(
                            "{}.{} is linked but not a source column",
                            src_name, src_col
                        )));
                    }
                    if !sp.col_defs.contains_key(sp_col) {
                        return Err(MigrateError::ModelInvariant(format!(
                            "{}.{} is linked but not a target column",
                            sp_name, sp_col
                        )));
                    }
                }
            }
        }

        for (sp_name, table) in &self.sp_schema {
            if self.relation.source_table(sp_name).is_none() {
                return Err(MigrateError::ModelInvariant(format!(
                    "target table {} has no source table",
                    sp_name
                )));
            }
            if table.col_names.len() != table.col_defs.len() {
                return Err(MigrateError::ModelInvariant(format!(
                    "target table {} column order and definitions disagree",
                    sp_name
                )));
            }
            for col in &table.col_names {
                if !table.col_defs.contains_key(col) {
                    return Err(MigrateError::ModelInvariant(format!(
                        "{}.{} is ordered but not defined",
                        sp_name, col
                    )));
                }
                if !self.is_synthetic_column(sp_name, col)
                    && self.relation.source_column(sp_name, col).is_none()
                {
                    return Err(MigrateError::ModelInvariant(format!(
                        "{}.{} has no source column",
                        sp_name, col
                    )));
                }
            }
            for key in &table.pks {
                if !table.col_defs.contains_key(&key.col) {
                    return Err(MigrateError::ModelInvariant(format!(
                        "{} primary key uses unknown column {}",
                        sp_name, key.col
                    )));
                }
            }
            if let Some(parent) = &table.parent {
                if self.synthetic_pkeys.contains_key(sp_name) {
                    return Err(MigrateError::ModelInvariant(format!(
                        "{} has a synthetic primary key but is interleaved in {}",
                        sp_name, parent
                    )));
                }
                if !self.sp_schema.contains_key(parent) {
                    return Err(MigrateError::ModelInvariant(format!(
                        "{} is interleaved in unknown table {}",
                        sp_name, parent
                    )));
                }
            }
        }
        Ok(())
    }

    /// Write the model as JSON, atomically.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;

        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, &content)?;
        std::fs::rename(&temp_path, path)?;
        Ok(())
    }

    /// Load a model written by [`Conv::save`] and verify its invariants.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let conv: Self = serde_json::from_str(&content)?;
        conv.check_invariants()?;
        Ok(conv)
    }

    /// Per-table column, warning and rating summary in snapshot order.
    pub fn table_summaries(&self) -> Vec<TableSummary> {
        let mut summaries = Vec::new();
        for (src_name, sp_name) in self.ordered_tables() {
            let Some(sp) = self.sp_schema.get(&sp_name) else {
                continue;
            };
            let (mut warnings, mut notes) = (0, 0);
            if let Some(cols) = self.issues.get(&src_name) {
                for (col, list) in cols {
                    if self.relation.spanner_column(&src_name, col).is_none() {
                        continue;
                    }
                    for issue in list {
                        if issue.is_warning() {
                            warnings += 1;
                        } else {
                            notes += 1;
                        }
                    }
                }
            }
            let synthetic_pk = self.synthetic_pkeys.contains_key(&sp_name);
            let columns = sp.col_names.len() as i64;
            summaries.push(TableSummary {
                rating: rate_schema(columns, warnings, synthetic_pk),
                src_table: src_name,
                sp_table: sp_name,
                columns,
                warnings,
                notes,
                synthetic_pk,
                interleaved_in: sp.parent.clone(),
            });
        }
        summaries
    }

    /// `(source, target)` table names in snapshot order.
    pub fn ordered_tables(&self) -> Vec<(String, String)> {
        self.tables
            .iter()
            .filter_map(|t| {
                self.relation
                    .spanner_table(&t.src_name)
                    .map(|sp| (t.src_name.clone(), sp.to_string()))
            })
            .collect()
    }

    /// Rating of the whole schema.
    pub fn schema_rating(&self) -> Rating {
        let summaries = self.table_summaries();
        let cols = summaries.iter().map(|s| s.columns).sum();
        let warnings = summaries.iter().map(|s| s.warnings).sum();
        let missing_pk = summaries.iter().any(|s| s.synthetic_pk);
        rate_schema(cols, warnings, missing_pk)
    }

    /// Rating of the data conversion by bad rows over all rows.
    pub fn data_rating(&self) -> Rating {
        let total = self
            .stats
            .total_rows()
            .max(self.stats.total_good_rows() + self.stats.total_bad_rows());
        rate_schema(total, self.stats.total_bad_rows(), false)
    }

    /// Convert one source row into target values.
    ///
    /// Uses and advances the table's synthetic key sequence.
    pub fn convert_row(
        &mut self,
        src_table: &str,
        src_cols: &[String],
        values: &[RawValue],
    ) -> std::result::Result<ConvertedRow, ConversionError> {
        let converter = TableConverter::new(self, src_table, src_cols)?;
        let sp_table = converter.sp_table().to_string();
        let mut seq = self
            .synthetic_pkeys
            .get(&sp_table)
            .map(|k| k.sequence)
            .unwrap_or(0);
        let row = converter.convert(values, &mut seq)?;
        if let Some(key) = self.synthetic_pkeys.get_mut(&sp_table) {
            key.sequence = seq;
        }
        Ok(row)
    }
}
