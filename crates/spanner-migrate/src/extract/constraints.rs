//! Primary key, constraint and foreign key extraction.

use std::collections::{BTreeMap, BTreeSet};

use crate::conv::Conv;
use crate::core::schema::{ConstraintInfo, ConstraintKind, ForeignKey, ForeignKeyInfo};

/// Constraints of one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedConstraints {
    /// Primary key columns in key ordinal order.
    pub primary_keys: Vec<String>,
    /// Non-primary-key constraints per column.
    pub by_column: BTreeMap<String, BTreeSet<ConstraintKind>>,
}

impl ExtractedConstraints {
    pub fn has(&self, column: &str, kind: ConstraintKind) -> bool {
        self.by_column
            .get(column)
            .is_some_and(|kinds| kinds.contains(&kind))
    }
}

/// Split `(column, kind)` rows into the primary key and per-column kinds.
///
/// Row order is the key ordinal order and is kept as is.
pub fn extract_constraints(
    conv: &mut Conv,
    table: &str,
    rows: &[ConstraintInfo],
) -> ExtractedConstraints {
    let mut out = ExtractedConstraints::default();

    for row in rows {
        if row.column.is_empty() || row.kind.is_empty() {
            conv.unexpected(format!(
                "Got empty column or constraint kind for table {}: ({:?}, {:?})",
                table, row.column, row.kind
            ));
            continue;
        }
        match ConstraintKind::parse(&row.kind) {
            Some(ConstraintKind::PrimaryKey) => {
                if !out.primary_keys.contains(&row.column) {
                    out.primary_keys.push(row.column.clone());
                }
            }
            Some(kind) => {
                out.by_column
                    .entry(row.column.clone())
                    .or_default()
                    .insert(kind);
            }
            None => conv.unexpected(format!(
                "Unknown constraint kind {} on {}.{}",
                row.kind, table, row.column
            )),
        }
    }

    out
}

/// Turn catalog foreign keys into source foreign keys.
///
/// Keys keep their catalog order, including several keys to the same table.
pub fn extract_foreign_keys(
    conv: &mut Conv,
    table: &str,
    implicit_schema: &str,
    fks: &[ForeignKeyInfo],
) -> Vec<ForeignKey> {
    let mut out = Vec::with_capacity(fks.len());

    for fk in fks {
        if fk.columns.is_empty() || fk.columns.len() != fk.ref_columns.len() {
            conv.unexpected(format!(
                "Foreign key {} on {} has {} local and {} referenced columns",
                fk.name,
                table,
                fk.columns.len(),
                fk.ref_columns.len()
            ));
            continue;
        }
        out.push(ForeignKey {
            name: fk.name.clone(),
            columns: fk.columns.clone(),
            ref_table: fk.ref_table.source_name(implicit_schema),
            ref_columns: fk.ref_columns.clone(),
        });
    }

    out
}
