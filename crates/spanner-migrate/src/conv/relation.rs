//! Two-way name correspondence between source and target schemas.
//!
//! Both directions live in one object and are only mutated together, so they
//! stay exact inverses of each other.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};

/// A table name plus its column name mapping in one direction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameAndCols {
    pub name: String,
    pub cols: BTreeMap<String, String>,
}

impl NameAndCols {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            cols: BTreeMap::new(),
        }
    }
}

/// Source ↔ target table and column names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correspondence {
    /// Source table → target table and source column → target column.
    to_spanner: BTreeMap<String, NameAndCols>,
    /// Target table → source table and target column → source column.
    to_source: BTreeMap<String, NameAndCols>,
}

impl Correspondence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link a source table to a target table.
    pub fn link_table(&mut self, src_table: &str, sp_table: &str) -> Result<()> {
        if let Some(existing) = self.to_spanner.get(src_table) {
            if existing.name == sp_table {
                return Ok(());
            }
            return Err(MigrateError::ModelInvariant(format!(
                "source table {} already maps to {}",
                src_table, existing.name
            )));
        }
        if let Some(existing) = self.to_source.get(sp_table) {
            return Err(MigrateError::ModelInvariant(format!(
                "target table {} already maps to {}",
                sp_table, existing.name
            )));
        }

        self.to_spanner
            .insert(src_table.to_string(), NameAndCols::new(sp_table));
        self.to_source
            .insert(sp_table.to_string(), NameAndCols::new(src_table));
        Ok(())
    }

    /// Link a source column to a target column of an already linked table.
    pub fn link_column(&mut self, src_table: &str, src_col: &str, sp_col: &str) -> Result<()> {
        let sp_table = self
            .spanner_table(src_table)
            .ok_or_else(|| MigrateError::UnknownTable(src_table.to_string()))?
            .to_string();

        let forward = self.to_spanner.get_mut(src_table);
        let backward = self.to_source.get_mut(&sp_table);
        match (forward, backward) {
            (Some(forward), Some(backward)) => {
                if backward.cols.contains_key(sp_col) {
                    return Err(MigrateError::ModelInvariant(format!(
                        "target column {}.{} is already linked",
                        sp_table, sp_col
                    )));
                }
                forward.cols.insert(src_col.to_string(), sp_col.to_string());
                backward.cols.insert(sp_col.to_string(), src_col.to_string());
                Ok(())
            }
            _ => Err(MigrateError::ModelInvariant(format!(
                "table link {} ↔ {} is one-sided",
                src_table, sp_table
            ))),
        }
    }

    /// Rename a target column in both directions.
    pub fn rename_column(&mut self, sp_table: &str, old: &str, new: &str) -> Result<()> {
        let backward = self
            .to_source
            .get_mut(sp_table)
            .ok_or_else(|| MigrateError::UnknownTable(sp_table.to_string()))?;
        let Some(src_col) = backward.cols.remove(old) else {
            return Ok(());
        };
        backward.cols.insert(new.to_string(), src_col.clone());

        let src_table = backward.name.clone();
        if let Some(forward) = self.to_spanner.get_mut(&src_table) {
            forward.cols.insert(src_col, new.to_string());
        }
        Ok(())
    }

    /// Unlink a target column in both directions, returning its source column.
    pub fn remove_column(&mut self, sp_table: &str, sp_col: &str) -> Option<String> {
        let backward = self.to_source.get_mut(sp_table)?;
        let src_col = backward.cols.remove(sp_col)?;
        let src_table = backward.name.clone();
        if let Some(forward) = self.to_spanner.get_mut(&src_table) {
            forward.cols.remove(&src_col);
        }
        Some(src_col)
    }

    pub fn spanner_table(&self, src_table: &str) -> Option<&str> {
        self.to_spanner.get(src_table).map(|n| n.name.as_str())
    }

    pub fn source_table(&self, sp_table: &str) -> Option<&str> {
        self.to_source.get(sp_table).map(|n| n.name.as_str())
    }

    pub fn spanner_column(&self, src_table: &str, src_col: &str) -> Option<&str> {
        self.to_spanner
            .get(src_table)
            .and_then(|n| n.cols.get(src_col))
            .map(String::as_str)
    }

    pub fn source_column(&self, sp_table: &str, sp_col: &str) -> Option<&str> {
        self.to_source
            .get(sp_table)
            .and_then(|n| n.cols.get(sp_col))
            .map(String::as_str)
    }

    /// Source column → target column map of a source table.
    pub fn spanner_columns(&self, src_table: &str) -> Option<&BTreeMap<String, String>> {
        self.to_spanner.get(src_table).map(|n| &n.cols)
    }

    /// `(source table, target table)` pairs.
    pub fn tables(&self) -> impl Iterator<Item = (&str, &str)> {
        self.to_spanner
            .iter()
            .map(|(src, n)| (src.as_str(), n.name.as_str()))
    }

    /// Verify that both directions are exact inverses.
    pub fn check(&self) -> Result<()> {
        if self.to_spanner.len() != self.to_source.len() {
            return Err(MigrateError::ModelInvariant(format!(
                "{} source tables but {} target tables in correspondence",
                self.to_spanner.len(),
                self.to_source.len()
            )));
        }

        for (src_table, forward) in &self.to_spanner {
            let backward = self.to_source.get(&forward.name).ok_or_else(|| {
                MigrateError::ModelInvariant(format!(
                    "{} → {} has no reverse entry",
                    src_table, forward.name
                ))
            })?;
            if backward.name != *src_table || backward.cols.len() != forward.cols.len() {
                return Err(MigrateError::ModelInvariant(format!(
                    "{} ↔ {} is not symmetric",
                    src_table, forward.name
                )));
            }
            for (src_col, sp_col) in &forward.cols {
                if backward.cols.get(sp_col) != Some(src_col) {
                    return Err(MigrateError::ModelInvariant(format!(
                        "{}.{} → {}.{} has no reverse entry",
                        src_table, src_col, forward.name, sp_col
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_relation() -> Correspondence {
        let mut rel = Correspondence::new();
        rel.link_table("sales.orders", "sales_orders").unwrap();
        rel.link_column("sales.orders", "id", "id").unwrap();
        rel.link_column("sales.orders", "order date", "order_date").unwrap();
        rel
    }

    #[test]
    fn test_lookups_both_directions() {
        let rel = make_relation();
        assert_eq!(rel.spanner_table("sales.orders"), Some("sales_orders"));
        assert_eq!(rel.source_table("sales_orders"), Some("sales.orders"));
        assert_eq!(rel.spanner_column("sales.orders", "order date"), Some("order_date"));
        assert_eq!(rel.source_column("sales_orders", "order_date"), Some("order date"));
        assert!(rel.check().is_ok());
    }

    #[test]
    fn test_rename_updates_both_directions() {
        let mut rel = make_relation();
        rel.rename_column("sales_orders", "order_date", "placed_at").unwrap();
        assert_eq!(rel.spanner_column("sales.orders", "order date"), Some("placed_at"));
        assert_eq!(rel.source_column("sales_orders", "placed_at"), Some("order date"));
        assert_eq!(rel.source_column("sales_orders", "order_date"), None);
        assert!(rel.check().is_ok());
    }

    #[test]
    fn test_remove_updates_both_directions() {
        let mut rel = make_relation();
        assert_eq!(rel.remove_column("sales_orders", "id"), Some("id".to_string()));
        assert_eq!(rel.spanner_column("sales.orders", "id"), None);
        assert_eq!(rel.remove_column("sales_orders", "id"), None);
        assert!(rel.check().is_ok());
    }

    #[test]
    fn test_duplicate_links_rejected() {
        let mut rel = make_relation();
        assert!(rel.link_table("sales.orders", "sales_orders").is_ok());
        assert!(rel.link_table("orders", "sales_orders").is_err());
        assert!(rel.link_column("sales.orders", "other", "id").is_err());
        assert!(rel.link_column("missing", "id", "id").is_err());
    }
}
