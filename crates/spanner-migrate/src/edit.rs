//! Schema edit protocol.
//!
//! Edits address target tables and columns by their current target names.
//! Each column's edit is validated in full before anything is changed, so a
//! rejected edit leaves that column as it was. Within one column the steps
//! run in a fixed order: remove, rename, primary key, retype, not null.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::conv::{Conv, SchemaIssue};
use crate::core::identifier::sanitize_spanner_name;
use crate::core::traits::{TypeMapper, TypeMapping};
use crate::ddl::{IndexKey, TypeFamily};
use crate::error::{MigrateError, Result};
use crate::interleave::revalidate_interleaving;

/// A toggle in an edit request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Change {
    #[default]
    None,
    Added,
    Removed,
}

/// Requested changes to one target column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnEdit {
    pub removed: bool,
    pub rename_to: Option<String>,
    pub primary_key: Change,
    pub not_null: Change,
    pub retype_to: Option<TypeFamily>,
}

impl ColumnEdit {
    pub fn remove() -> Self {
        Self {
            removed: true,
            ..Default::default()
        }
    }

    pub fn rename(to: impl Into<String>) -> Self {
        Self {
            rename_to: Some(to.into()),
            ..Default::default()
        }
    }

    pub fn retype(family: TypeFamily) -> Self {
        Self {
            retype_to: Some(family),
            ..Default::default()
        }
    }

    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Target column → edit.
pub type TableEdits = BTreeMap<String, ColumnEdit>;

/// Target table → column edits, as read from an edits file.
pub type EditFile = BTreeMap<String, TableEdits>;

/// A validated column edit, ready to commit.
enum Plan {
    Remove,
    Update {
        rename: Option<String>,
        primary_key: Change,
        retype: Option<(String, String, TypeMapping)>,
        not_null: Change,
    },
}

/// Apply a batch of column edits to one target table.
///
/// Columns are processed in name order. The first failing column stops the
/// batch; columns already processed stay edited. Primary keys are recomputed
/// afterwards in either case, so a table left without one gets a synthetic key.
/// Interleaving of the table and of its children is then checked again.
pub fn apply_column_edits(conv: &mut Conv, table: &str, edits: &TableEdits) -> Result<()> {
    if !conv.sp_schema.contains_key(table) {
        return Err(MigrateError::UnknownTable(table.to_string()));
    }

    let mut outcome = Ok(());
    for (col, edit) in edits {
        let committed = plan_column_edit(conv, table, col, edit).and_then(|planned| match planned {
            Some(plan) => commit(conv, table, col, plan),
            None => Ok(()),
        });
        if let Err(e) = committed {
            outcome = Err(e);
            break;
        }
    }

    for sp_table in conv.add_primary_keys() {
        debug!("Table {} has no primary key after edits; added synthetic key", sp_table);
    }
    for child in revalidate_interleaving(conv, table) {
        info!("Table {} is no longer interleaved after edits to {}", child, table);
    }
    conv.check_invariants()?;
    outcome
}

fn plan_column_edit(conv: &Conv, table: &str, col: &str, edit: &ColumnEdit) -> Result<Option<Plan>> {
    let sp = conv.sp_table(table)?;

    if !sp.col_defs.contains_key(col) {
        if edit.removed || edit.is_empty() {
            return Ok(None);
        }
        return Err(MigrateError::edit(table, col, "no such column"));
    }

    if edit.removed {
        return Ok(Some(Plan::Remove));
    }

    let rename = match &edit.rename_to {
        Some(to) => {
            let new = sanitize_spanner_name(to);
            if new == col {
                None
            } else if sp
                .col_names
                .iter()
                .any(|c| c != col && c.eq_ignore_ascii_case(&new))
            {
                return Err(MigrateError::edit(
                    table,
                    col,
                    format!("column {} already exists", new),
                ));
            } else {
                Some(new)
            }
        }
        None => None,
    };

    let retype = match edit.retype_to {
        Some(family) => {
            let (src_table, src_col) = conv
                .relation
                .source_table(table)
                .zip(conv.relation.source_column(table, col))
                .ok_or_else(|| MigrateError::edit(table, col, "column has no source column"))?;
            let src_def = conv
                .src_schema
                .get(src_table)
                .and_then(|t| t.column(src_col))
                .ok_or_else(|| {
                    MigrateError::edit(table, col, format!("source column {}.{} is missing", src_table, src_col))
                })?;
            let mapping = conv
                .dialect
                .mapper()
                .map_source_type(&src_def.source_type, Some(family));
            Some((src_table.to_string(), src_col.to_string(), mapping))
        }
        None => None,
    };

    Ok(Some(Plan::Update {
        rename,
        primary_key: edit.primary_key,
        retype,
        not_null: edit.not_null,
    }))
}

fn commit(conv: &mut Conv, table: &str, col: &str, plan: Plan) -> Result<()> {
    match plan {
        Plan::Remove => remove_column(conv, table, col),
        Plan::Update {
            rename,
            primary_key,
            retype,
            not_null,
        } => {
            let col = match rename {
                Some(new) => {
                    rename_column(conv, table, col, &new)?;
                    new
                }
                None => col.to_string(),
            };
            set_primary_key(conv, table, &col, primary_key);
            if let Some((src_table, src_col, mapping)) = retype {
                retype_column(conv, table, &col, &src_table, &src_col, mapping);
            }
            if let Some(def) = conv
                .sp_schema
                .get_mut(table)
                .and_then(|t| t.col_defs.get_mut(&col))
            {
                match not_null {
                    Change::Added => def.not_null = true,
                    Change::Removed => def.not_null = false,
                    Change::None => {}
                }
            }
        }
    }
    Ok(())
}

fn remove_column(conv: &mut Conv, table: &str, col: &str) {
    if let Some(sp) = conv.sp_schema.get_mut(table) {
        sp.col_names.retain(|c| c != col);
        sp.col_defs.remove(col);
        sp.pks.retain(|k| k.col != col);
        sp.fks.retain(|fk| !fk.columns.iter().any(|c| c == col));
    }
    for other in conv.sp_schema.values_mut() {
        other
            .fks
            .retain(|fk| !(fk.refer_table == table && fk.refer_columns.iter().any(|c| c == col)));
    }
    for (child, status) in conv.interleave.iter_mut() {
        let uses_col = status.consumed_fk.as_ref().is_some_and(|fk| {
            (child == table && fk.columns.iter().any(|c| c == col))
                || (fk.refer_table == table && fk.refer_columns.iter().any(|c| c == col))
        });
        if uses_col {
            status.consumed_fk = None;
        }
    }

    if conv.is_synthetic_column(table, col) {
        conv.synthetic_pkeys.remove(table);
    }

    let src_table = conv.relation.source_table(table).map(String::from);
    if let (Some(src_table), Some(src_col)) = (src_table, conv.relation.remove_column(table, col)) {
        if let Some(cols) = conv.issues.get_mut(&src_table) {
            cols.remove(&src_col);
        }
    }
    debug!("Removed column {}.{}", table, col);
}

fn rename_column(conv: &mut Conv, table: &str, old: &str, new: &str) -> Result<()> {
    if let Some(sp) = conv.sp_schema.get_mut(table) {
        for name in sp.col_names.iter_mut().filter(|c| *c == old) {
            *name = new.to_string();
        }
        if let Some(mut def) = sp.col_defs.remove(old) {
            def.name = new.to_string();
            sp.col_defs.insert(new.to_string(), def);
        }
        for key in sp.pks.iter_mut().filter(|k| k.col == old) {
            key.col = new.to_string();
        }
        for fk in sp.fks.iter_mut() {
            for c in fk.columns.iter_mut().filter(|c| *c == old) {
                *c = new.to_string();
            }
        }
    }
    for other in conv.sp_schema.values_mut() {
        for fk in other.fks.iter_mut().filter(|fk| fk.refer_table == table) {
            for c in fk.refer_columns.iter_mut().filter(|c| *c == old) {
                *c = new.to_string();
            }
        }
    }

    for (child, status) in conv.interleave.iter_mut() {
        let Some(fk) = status.consumed_fk.as_mut() else {
            continue;
        };
        if child == table {
            for c in fk.columns.iter_mut().filter(|c| *c == old) {
                *c = new.to_string();
            }
        }
        if fk.refer_table == table {
            for c in fk.refer_columns.iter_mut().filter(|c| *c == old) {
                *c = new.to_string();
            }
        }
    }

    if let Some(key) = conv.synthetic_pkeys.get_mut(table) {
        if key.col == old {
            key.col = new.to_string();
        }
    }
    conv.relation
        .rename_column(table, old, new)
        .map_err(|e| MigrateError::ModelInvariant(format!("renaming {}.{}: {}", table, old, e)))?;
    debug!("Renamed column {}.{} to {}", table, old, new);
    Ok(())
}

fn set_primary_key(conv: &mut Conv, table: &str, col: &str, change: Change) {
    let synthetic = conv.synthetic_pkeys.get(table).map(|k| k.col.clone());
    let Some(sp) = conv.sp_schema.get_mut(table) else {
        return;
    };

    match change {
        Change::Added => {
            if !sp.has_pk_column(col) {
                sp.pks.push(IndexKey::asc(col));
            }
            if let Some(synth) = synthetic.filter(|s| s != col) {
                sp.col_names.retain(|c| *c != synth);
                sp.col_defs.remove(&synth);
                sp.pks.retain(|k| k.col != synth);
                conv.synthetic_pkeys.remove(table);
                debug!("Retired synthetic key {}.{}", table, synth);
            }
        }
        Change::Removed => sp.pks.retain(|k| k.col != col),
        Change::None => {}
    }
}

fn retype_column(
    conv: &mut Conv,
    table: &str,
    col: &str,
    src_table: &str,
    src_col: &str,
    mapping: TypeMapping,
) {
    if let Some(def) = conv
        .sp_schema
        .get_mut(table)
        .and_then(|t| t.col_defs.get_mut(col))
    {
        def.t = mapping.target;
    }

    let kept: Vec<SchemaIssue> = conv
        .column_issues(src_table, src_col)
        .iter()
        .copied()
        .filter(SchemaIssue::is_type_independent)
        .collect();
    if let Some(cols) = conv.issues.get_mut(src_table) {
        cols.remove(src_col);
    }
    for issue in kept.into_iter().chain(mapping.issues) {
        conv.add_issue(src_table, src_col, issue);
    }
}

/// Retype every column whose source type is in `type_map`.
///
/// Keys are source type names, compared case-insensitively. Returns the
/// number of columns retyped.
pub fn apply_global_type_map(conv: &mut Conv, type_map: &BTreeMap<String, TypeFamily>) -> Result<usize> {
    let type_map: BTreeMap<String, TypeFamily> = type_map
        .iter()
        .map(|(k, v)| (k.to_lowercase(), *v))
        .collect();

    let mut batches: Vec<(String, TableEdits)> = Vec::new();
    for (src_name, sp_name) in conv.ordered_tables() {
        let Some(src) = conv.src_schema.get(&src_name) else {
            continue;
        };
        let mut edits = TableEdits::new();
        for src_col in &src.col_names {
            let Some(family) = src
                .column(src_col)
                .and_then(|c| type_map.get(&c.source_type.name.to_lowercase()))
            else {
                continue;
            };
            if let Some(sp_col) = conv.relation.spanner_column(&src_name, src_col) {
                edits.insert(sp_col.to_string(), ColumnEdit::retype(*family));
            }
        }
        if !edits.is_empty() {
            batches.push((sp_name, edits));
        }
    }

    let mut count = 0;
    for (sp_name, edits) in batches {
        apply_column_edits(conv, &sp_name, &edits)?;
        count += edits.len();
    }
    info!("Global type map retyped {} columns", count);
    Ok(count)
}

/// Read an edits file (YAML or JSON): table → column → edit.
pub fn load_edit_file<P: AsRef<Path>>(path: P) -> Result<EditFile> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&content)?)
}

/// Apply every table's edits from an edits file.
pub fn apply_edit_file(conv: &mut Conv, edits: &EditFile) -> Result<()> {
    info!("Applying edits to {} tables", edits.len());
    for (table, table_edits) in edits {
        apply_column_edits(conv, table, table_edits)?;
    }
    Ok(())
}
