//! Interleaving resolution.
//!
//! A child table can be interleaved in a parent when the parent's primary key
//! is a prefix of the child's and a foreign key links exactly those columns.
//! The qualifying foreign key is replaced by the interleave relationship.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::conv::Conv;
use crate::ddl::{CreateTable, Foreignkey};
use crate::error::{MigrateError, Result};

pub const REASON_SYNTHETIC_PK: &str = "has synthetic primary key";
pub const REASON_NO_KEY_PREFIX: &str = "no valid key prefix";

/// Interleaving decision for one target table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterleaveStatus {
    pub possible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default)]
    pub comment: String,
    /// Foreign key replaced by the interleave relationship.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumed_fk: Option<Foreignkey>,
}

impl InterleaveStatus {
    fn interleaved(parent: &str, consumed_fk: Option<Foreignkey>) -> Self {
        Self {
            possible: true,
            parent: Some(parent.to_string()),
            comment: String::new(),
            consumed_fk,
        }
    }

    fn rejected(reason: &str) -> Self {
        Self {
            possible: false,
            parent: None,
            comment: reason.to_string(),
            consumed_fk: None,
        }
    }
}

/// Whether `parent`'s primary key is a prefix of `child`'s through `fk`.
pub fn check_primary_key_prefix(child: &CreateTable, parent: &CreateTable, fk: &Foreignkey) -> bool {
    if child.pks.len() < parent.pks.len()
        || fk.columns.len() < parent.pks.len()
        || fk.refer_columns.len() < parent.pks.len()
    {
        return false;
    }

    parent.pks.iter().enumerate().all(|(i, parent_key)| {
        parent_key.col == fk.refer_columns[i]
            && child.pks[i].col == fk.columns[i]
            && fk.columns[i] == fk.refer_columns[i]
    })
}

/// Whether making `parent` the parent of `child` would close a cycle.
fn creates_cycle(conv: &Conv, child: &str, parent: &str) -> bool {
    let mut current = Some(parent.to_string());
    let mut steps = 0;
    while let Some(name) = current {
        if name == child || steps > conv.sp_schema.len() {
            return true;
        }
        current = conv.sp_schema.get(&name).and_then(|t| t.parent.clone());
        steps += 1;
    }
    false
}

/// Decide and apply interleaving for one target table.
pub fn check_interleaving(conv: &mut Conv, sp_table: &str) -> Result<InterleaveStatus> {
    let table = conv
        .sp_schema
        .get(sp_table)
        .ok_or_else(|| MigrateError::UnknownTable(sp_table.to_string()))?;

    if let Some(parent) = &table.parent {
        let status = match conv.interleave.get(sp_table) {
            Some(s) if s.parent.as_ref() == Some(parent) => s.clone(),
            _ => InterleaveStatus::interleaved(parent, None),
        };
        conv.interleave.insert(sp_table.to_string(), status.clone());
        return Ok(status);
    }

    if conv.synthetic_pkeys.contains_key(sp_table) {
        let status = InterleaveStatus::rejected(REASON_SYNTHETIC_PK);
        conv.interleave.insert(sp_table.to_string(), status.clone());
        return Ok(status);
    }

    let mut chosen = None;
    for (i, fk) in table.fks.iter().enumerate() {
        if fk.refer_table == sp_table || conv.synthetic_pkeys.contains_key(&fk.refer_table) {
            continue;
        }
        let Some(parent) = conv.sp_schema.get(&fk.refer_table) else {
            continue;
        };
        if creates_cycle(conv, sp_table, &fk.refer_table) {
            debug!("{} in {} would create a cycle", sp_table, fk.refer_table);
            continue;
        }
        if check_primary_key_prefix(table, parent, fk) {
            chosen = Some((i, fk.refer_table.clone()));
            break;
        }
    }

    let status = match chosen {
        Some((i, parent)) => {
            let consumed = conv.sp_schema.get_mut(sp_table).map(|table| {
                table.parent = Some(parent.clone());
                table.fks.remove(i)
            });
            debug!("Interleaved {} in {}", sp_table, parent);
            InterleaveStatus::interleaved(&parent, consumed)
        }
        None => InterleaveStatus::rejected(REASON_NO_KEY_PREFIX),
    };
    conv.interleave.insert(sp_table.to_string(), status.clone());
    Ok(status)
}

/// Resolve interleaving for every table in snapshot order.
pub fn resolve_interleaving(conv: &mut Conv) -> Result<Vec<(String, InterleaveStatus)>> {
    info!("Phase 2: Resolving interleaving");

    let mut statuses = Vec::new();
    for (_, sp_table) in conv.ordered_tables() {
        let status = check_interleaving(conv, &sp_table)?;
        statuses.push((sp_table, status));
    }
    conv.check_invariants()?;

    let interleaved = statuses.iter().filter(|(_, s)| s.possible).count();
    info!("Interleaved {} of {} tables", interleaved, statuses.len());
    Ok(statuses)
}

/// Undo interleaving that edits to `sp_table` have invalidated.
///
/// `sp_table` is checked against its own parent, and every table interleaved
/// in it against `sp_table`. A child that no longer qualifies loses its
/// parent and gets the consumed foreign key back as a plain foreign key.
/// Returns the released children.
pub fn revalidate_interleaving(conv: &mut Conv, sp_table: &str) -> Vec<String> {
    let mut children: Vec<String> = conv
        .sp_schema
        .iter()
        .filter(|(_, t)| t.parent.as_deref() == Some(sp_table))
        .map(|(name, _)| name.clone())
        .collect();
    if conv.sp_schema.get(sp_table).is_some_and(|t| t.parent.is_some()) {
        children.insert(0, sp_table.to_string());
    }

    let mut released = Vec::new();
    for child in children {
        if still_interleaved(conv, &child) {
            continue;
        }
        let consumed = conv.interleave.get(&child).and_then(|s| s.consumed_fk.clone());
        let reason = if conv.synthetic_pkeys.contains_key(&child) {
            REASON_SYNTHETIC_PK
        } else {
            REASON_NO_KEY_PREFIX
        };
        if let Some(table) = conv.sp_schema.get_mut(&child) {
            let parent = table.parent.take();
            if let Some(fk) = consumed {
                table.fks.push(fk);
            }
            debug!("Released {} from {:?}: {}", child, parent, reason);
        }
        conv.interleave.insert(child.clone(), InterleaveStatus::rejected(reason));
        released.push(child);
    }
    released
}

fn still_interleaved(conv: &Conv, child: &str) -> bool {
    if conv.synthetic_pkeys.contains_key(child) {
        return false;
    }
    let Some(table) = conv.sp_schema.get(child) else {
        return false;
    };
    let Some(parent) = table.parent.as_ref().and_then(|p| conv.sp_schema.get(p)) else {
        return false;
    };
    if conv.synthetic_pkeys.contains_key(&parent.name) {
        return false;
    }
    conv.interleave
        .get(child)
        .and_then(|s| s.consumed_fk.as_ref())
        .is_some_and(|fk| check_primary_key_prefix(table, parent, fk))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conv::TableSnapshot;
    use crate::core::schema::{SourceColumn, SourceTable, SourceType, TableRef};
    use crate::ddl::{ColumnDef, IndexKey, SpannerType, TypeFamily};
    use crate::dialect::SourceDialect;

    fn make_fk(cols: &[&str], refer_table: &str, refer_cols: &[&str]) -> Foreignkey {
        Foreignkey {
            name: format!("fk_{}", refer_table),
            columns: cols.iter().map(|c| c.to_string()).collect(),
            refer_table: refer_table.to_string(),
            refer_columns: refer_cols.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Adds a table whose source and target names and columns are identical.
    fn add_table(conv: &mut Conv, name: &str, cols: &[&str], pks: &[&str], fks: Vec<Foreignkey>) {
        let mut src = SourceTable {
            name: name.to_string(),
            schema: "public".to_string(),
            col_names: Vec::new(),
            col_defs: Default::default(),
            primary_keys: pks.iter().map(|c| c.to_string()).collect(),
            foreign_keys: Vec::new(),
        };
        let mut sp = CreateTable::new(name);
        conv.relation.link_table(name, name).unwrap();
        for col in cols {
            src.col_names.push(col.to_string());
            src.col_defs.insert(
                col.to_string(),
                SourceColumn {
                    name: col.to_string(),
                    source_type: SourceType::new("bigint"),
                    not_null: true,
                    unique: false,
                    ignored: Default::default(),
                },
            );
            sp.col_names.push(col.to_string());
            sp.col_defs.insert(
                col.to_string(),
                ColumnDef {
                    name: col.to_string(),
                    t: SpannerType::new(TypeFamily::Int64),
                    not_null: true,
                    comment: None,
                },
            );
            conv.relation.link_column(name, col, col).unwrap();
        }
        sp.pks = pks.iter().map(|c| IndexKey::asc(*c)).collect();
        sp.fks = fks;
        conv.src_schema.insert(name.to_string(), src);
        conv.sp_schema.insert(name.to_string(), sp);
        conv.tables.push(TableSnapshot {
            table_ref: TableRef::new("public", name),
            src_name: name.to_string(),
        });
    }

    #[test]
    fn test_prefix_accepted() {
        let mut conv = Conv::new(SourceDialect::Postgres);
        add_table(&mut conv, "p", &["a"], &["a"], vec![]);
        add_table(&mut conv, "c", &["a", "b"], &["a", "b"], vec![make_fk(&["a"], "p", &["a"])]);

        let status = check_interleaving(&mut conv, "c").unwrap();
        assert!(status.possible);
        assert_eq!(status.parent.as_deref(), Some("p"));
        assert_eq!(conv.sp_schema["c"].parent.as_deref(), Some("p"));
        assert!(conv.sp_schema["c"].fks.is_empty());
    }

    #[test]
    fn test_wrong_key_order_rejected() {
        let mut conv = Conv::new(SourceDialect::Postgres);
        add_table(&mut conv, "p", &["a"], &["a"], vec![]);
        add_table(&mut conv, "c", &["a", "b"], &["b", "a"], vec![make_fk(&["a"], "p", &["a"])]);

        let status = check_interleaving(&mut conv, "c").unwrap();
        assert!(!status.possible);
        assert_eq!(status.comment, REASON_NO_KEY_PREFIX);
        assert_eq!(conv.sp_schema["c"].fks.len(), 1);
    }

    #[test]
    fn test_check_primary_key_prefix_rules() {
        let mut parent = CreateTable::new("p");
        parent.pks = vec![IndexKey::asc("a")];
        let mut child = CreateTable::new("c");
        child.pks = vec![IndexKey::asc("a"), IndexKey::asc("b")];

        assert!(check_primary_key_prefix(&child, &parent, &make_fk(&["a"], "p", &["a"])));
        // Local and referenced column names must agree.
        assert!(!check_primary_key_prefix(&child, &parent, &make_fk(&["a"], "p", &["x"])));
        // Child key shorter than parent key.
        assert!(!check_primary_key_prefix(&parent, &child, &make_fk(&["a", "b"], "c", &["a", "b"])));
    }

    #[test]
    fn test_synthetic_tables_never_children_or_parents() {
        let mut conv = Conv::new(SourceDialect::Postgres);
        add_table(&mut conv, "p", &["a"], &[], vec![]);
        add_table(&mut conv, "c", &["a", "b"], &["a", "b"], vec![make_fk(&["a"], "p", &["a"])]);
        add_table(&mut conv, "s", &["a"], &[], vec![make_fk(&["a"], "c", &["a"])]);
        conv.add_primary_keys();

        let status = check_interleaving(&mut conv, "s").unwrap();
        assert_eq!(status.comment, REASON_SYNTHETIC_PK);

        let status = check_interleaving(&mut conv, "c").unwrap();
        assert!(!status.possible);
        assert_eq!(status.comment, REASON_NO_KEY_PREFIX);
    }

    #[test]
    fn test_self_reference_and_cycles_skipped() {
        let mut conv = Conv::new(SourceDialect::Postgres);
        add_table(&mut conv, "a", &["id"], &["id"], vec![make_fk(&["id"], "b", &["id"])]);
        add_table(&mut conv, "b", &["id"], &["id"], vec![make_fk(&["id"], "a", &["id"])]);
        add_table(&mut conv, "n", &["id"], &["id"], vec![make_fk(&["id"], "n", &["id"])]);

        let statuses = resolve_interleaving(&mut conv).unwrap();
        let by_name: std::collections::BTreeMap<_, _> = statuses.into_iter().collect();
        assert!(by_name["a"].possible);
        assert!(!by_name["b"].possible);
        assert!(!by_name["n"].possible);
    }

    #[test]
    fn test_first_qualifying_fk_wins_and_rerun_is_noop() {
        let mut conv = Conv::new(SourceDialect::Postgres);
        add_table(&mut conv, "p1", &["a"], &["a"], vec![]);
        add_table(&mut conv, "p2", &["a"], &["a"], vec![]);
        add_table(
            &mut conv,
            "c",
            &["a", "b"],
            &["a", "b"],
            vec![make_fk(&["a"], "p1", &["a"]), make_fk(&["a"], "p2", &["a"])],
        );

        resolve_interleaving(&mut conv).unwrap();
        assert_eq!(conv.sp_schema["c"].parent.as_deref(), Some("p1"));
        assert_eq!(conv.sp_schema["c"].fks.len(), 1);
        let before = conv.sp_schema.clone();

        resolve_interleaving(&mut conv).unwrap();
        assert_eq!(conv.sp_schema, before);
    }

    #[test]
    fn test_composite_key_prefix() {
        let mut conv = Conv::new(SourceDialect::Postgres);
        add_table(&mut conv, "p", &["a", "b"], &["a", "b"], vec![]);
        add_table(
            &mut conv,
            "c",
            &["a", "b", "c"],
            &["a", "b", "c"],
            vec![make_fk(&["a", "b"], "p", &["a", "b"])],
        );

        let statuses = resolve_interleaving(&mut conv).unwrap();
        let by_name: std::collections::BTreeMap<_, _> = statuses.into_iter().collect();
        assert!(by_name["c"].possible);
        assert_eq!(conv.sp_schema["c"].parent.as_deref(), Some("p"));
        assert!(conv.sp_schema["c"].fks.is_empty());
        assert_eq!(
            conv.interleave["c"].consumed_fk,
            Some(make_fk(&["a", "b"], "p", &["a", "b"]))
        );
    }

    #[test]
    fn test_composite_key_out_of_order_rejected() {
        let mut conv = Conv::new(SourceDialect::Postgres);
        add_table(&mut conv, "p", &["a", "b"], &["a", "b"], vec![]);
        add_table(
            &mut conv,
            "c",
            &["a", "b", "c"],
            &["b", "a", "c"],
            vec![make_fk(&["a", "b"], "p", &["a", "b"])],
        );

        let statuses = resolve_interleaving(&mut conv).unwrap();
        let by_name: std::collections::BTreeMap<_, _> = statuses.into_iter().collect();
        assert!(!by_name["c"].possible);
        assert_eq!(by_name["c"].comment, REASON_NO_KEY_PREFIX);
        assert_eq!(conv.sp_schema["c"].parent, None);
        assert_eq!(conv.sp_schema["c"].fks.len(), 1);
    }

    #[test]
    fn test_unknown_table() {
        let mut conv = Conv::new(SourceDialect::Postgres);
        assert!(matches!(
            check_interleaving(&mut conv, "missing"),
            Err(MigrateError::UnknownTable(_))
        ));
    }
}
