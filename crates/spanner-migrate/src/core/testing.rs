//! In-memory `SourceReader` used by unit tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::dialect::SourceDialect;
use crate::error::{MigrateError, Result};

use super::schema::{ColumnInfo, ConstraintInfo, ForeignKeyInfo, TableRef};
use super::traits::SourceReader;
use super::value::{RawValue, RowBatch, SourceRow};

#[derive(Debug, Clone, Default)]
pub struct MockTable {
    pub columns: Vec<ColumnInfo>,
    pub constraints: Vec<ConstraintInfo>,
    pub foreign_keys: Vec<ForeignKeyInfo>,
    pub rows: Vec<SourceRow>,
    pub fail_columns: bool,
    pub fail_stream: bool,
}

pub struct MockSource {
    pub dialect: SourceDialect,
    pub tables: BTreeMap<String, MockTable>,
}

impl MockSource {
    pub fn postgres() -> Self {
        Self {
            dialect: SourceDialect::Postgres,
            tables: BTreeMap::new(),
        }
    }

    pub fn mysql() -> Self {
        Self {
            dialect: SourceDialect::Mysql,
            tables: BTreeMap::new(),
        }
    }

    pub fn table(mut self, name: &str, table: MockTable) -> Self {
        self.tables.insert(name.to_string(), table);
        self
    }

    fn lookup(&self, table: &TableRef) -> Result<&MockTable> {
        self.tables
            .get(&table.name)
            .ok_or_else(|| MigrateError::introspection(table.to_string(), "no such table"))
    }
}

/// Column row with the given catalog type.
pub fn col(name: &str, type_name: &str, nullable: &str) -> ColumnInfo {
    ColumnInfo {
        name: name.to_string(),
        type_name: type_name.to_string(),
        nullable: nullable.to_string(),
        ..Default::default()
    }
}

pub fn pk(column: &str) -> ConstraintInfo {
    ConstraintInfo::new(column, "PRIMARY KEY")
}

pub fn fk(name: &str, columns: &[&str], ref_table: &str, ref_columns: &[&str]) -> ForeignKeyInfo {
    ForeignKeyInfo {
        name: name.to_string(),
        columns: columns.iter().map(|c| c.to_string()).collect(),
        ref_table: TableRef::new("public", ref_table),
        ref_columns: ref_columns.iter().map(|c| c.to_string()).collect(),
    }
}

pub fn row(values: Vec<RawValue>) -> SourceRow {
    Ok(values)
}

#[async_trait]
impl SourceReader for MockSource {
    fn dialect(&self) -> SourceDialect {
        self.dialect
    }

    fn implicit_schema(&self) -> &str {
        "public"
    }

    async fn list_tables(&self) -> Result<Vec<TableRef>> {
        Ok(self
            .tables
            .keys()
            .map(|name| TableRef::new("public", name.clone()))
            .collect())
    }

    async fn list_columns(&self, table: &TableRef) -> Result<Vec<ColumnInfo>> {
        let t = self.lookup(table)?;
        if t.fail_columns {
            return Err(MigrateError::introspection(table.to_string(), "permission denied"));
        }
        Ok(t.columns.clone())
    }

    async fn list_constraints(&self, table: &TableRef) -> Result<Vec<ConstraintInfo>> {
        Ok(self.lookup(table)?.constraints.clone())
    }

    async fn list_foreign_keys(&self, table: &TableRef) -> Result<Vec<ForeignKeyInfo>> {
        Ok(self.lookup(table)?.foreign_keys.clone())
    }

    async fn row_count(&self, table: &TableRef) -> Result<i64> {
        Ok(self.lookup(table)?.rows.len() as i64)
    }

    fn stream_rows(&self, table: &TableRef, batch_size: usize) -> mpsc::Receiver<Result<RowBatch>> {
        let (tx, rx) = mpsc::channel(4);
        let found = self.lookup(table).cloned();
        let name = table.to_string();

        tokio::spawn(async move {
            let t = match found {
                Ok(t) => t,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };
            if t.fail_stream {
                let _ = tx
                    .send(Err(MigrateError::conversion(name, "relation does not exist")))
                    .await;
                return;
            }

            let columns = Arc::new(t.columns.iter().map(|c| c.name.clone()).collect::<Vec<_>>());
            let chunks: Vec<Vec<SourceRow>> = t
                .rows
                .chunks(batch_size.max(1))
                .map(|c| c.to_vec())
                .collect();
            if chunks.is_empty() {
                let _ = tx.send(Ok(RowBatch::empty_final(columns))).await;
                return;
            }

            let last = chunks.len() - 1;
            for (i, rows) in chunks.into_iter().enumerate() {
                let mut batch = RowBatch::new(columns.clone(), rows);
                if i == last {
                    batch = batch.mark_final();
                }
                if tx.send(Ok(batch)).await.is_err() {
                    break;
                }
            }
        });

        rx
    }
}
