//! PostgreSQL source reader implementation.
//!
//! Implements [`SourceReader`] over information_schema and pg_catalog using
//! deadpool-postgres for connection pooling. Rows are read with every column
//! cast to text, so arrays arrive as `{...}` literals and bytea as `\x` hex.

use std::sync::Arc;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_postgres::Config as PgConfig;
use tracing::{debug, info, warn};

use crate::config::SourceConfig;
use crate::core::schema::{ColumnInfo, ConstraintInfo, ForeignKeyInfo, TableRef};
use crate::core::traits::SourceReader;
use crate::core::value::{RawValue, RowBatch, SourceRow};
use crate::dialect::SourceDialect;
use crate::drivers::common::SslMode;
use crate::error::{MigrateError, Result};

/// Schema whose tables keep their bare name.
const IMPLICIT_SCHEMA: &str = "public";

/// PostgreSQL source reader.
pub struct PostgresReader {
    pool: Pool,
    /// Restricts listing to one schema when set.
    schema: Option<String>,
}

impl PostgresReader {
    /// Connect to the configured source and verify the connection.
    pub async fn new(config: &SourceConfig, max_conns: usize) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.effective_port());
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let ssl_mode = SslMode::parse(&config.ssl_mode)?;
        let mgr = match ssl_mode.postgres_connector() {
            Some(tls) => Manager::from_config(pg_config, tls, mgr_config),
            None => {
                warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
                Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config)
            }
        };
        let pool = Pool::builder(mgr)
            .max_size(max_conns.max(1))
            .build()
            .map_err(|e| MigrateError::pool(e, "creating PostgreSQL source pool"))?;

        let client = pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "testing PostgreSQL source connection"))?;
        client.simple_query("SELECT 1").await?;

        info!(
            "Connected to PostgreSQL source: {}:{}/{}",
            config.host,
            config.effective_port(),
            config.database
        );

        Ok(Self {
            pool,
            schema: config.schema.clone(),
        })
    }

    async fn client(&self, context: &str) -> Result<deadpool_postgres::Client> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, context.to_string()))
    }

    /// Test the database connection.
    pub async fn test_connection(&self) -> Result<()> {
        let client = self.client("testing PostgreSQL connection").await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }
}

#[async_trait]
impl SourceReader for PostgresReader {
    fn dialect(&self) -> SourceDialect {
        SourceDialect::Postgres
    }

    fn implicit_schema(&self) -> &str {
        IMPLICIT_SCHEMA
    }

    async fn list_tables(&self) -> Result<Vec<TableRef>> {
        let client = self.client("getting connection for list_tables").await?;
        let excluded: Vec<String> = SourceDialect::Postgres
            .system_schemas()
            .iter()
            .map(|s| s.to_string())
            .collect();

        let query = r#"
            SELECT table_schema::text, table_name::text
            FROM information_schema.tables
            WHERE table_type = 'BASE TABLE'
              AND NOT (table_schema = ANY($1))
              AND ($2::text IS NULL OR table_schema = $2)
            ORDER BY table_schema, table_name
        "#;
        let rows = client.query(query, &[&excluded, &self.schema]).await?;

        let tables: Vec<TableRef> = rows
            .iter()
            .map(|row| TableRef::new(row.get::<_, String>(0), row.get::<_, String>(1)))
            .collect();
        debug!("Found {} tables", tables.len());
        Ok(tables)
    }

    async fn list_columns(&self, table: &TableRef) -> Result<Vec<ColumnInfo>> {
        let client = self.client("getting connection for list_columns").await?;

        let query = r#"
            SELECT
                c.column_name::text,
                c.data_type::text,
                e.data_type::text AS element_type,
                COALESCE(a.attndims, 0)::int4,
                c.is_nullable::text,
                c.column_default::text,
                c.is_identity::text,
                c.character_maximum_length::int8,
                CASE WHEN c.data_type = 'numeric' THEN c.numeric_precision::int8 END,
                CASE WHEN c.data_type = 'numeric' THEN c.numeric_scale::int8 END
            FROM information_schema.columns c
            LEFT JOIN information_schema.element_types e
              ON c.table_catalog = e.object_catalog
             AND c.table_schema = e.object_schema
             AND c.table_name = e.object_name
             AND e.object_type = 'TABLE'
             AND c.dtd_identifier = e.collection_type_identifier
            LEFT JOIN pg_catalog.pg_namespace n ON n.nspname = c.table_schema
            LEFT JOIN pg_catalog.pg_class t ON t.relnamespace = n.oid AND t.relname = c.table_name
            LEFT JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attname = c.column_name
            WHERE c.table_schema = $1 AND c.table_name = $2
            ORDER BY c.ordinal_position
        "#;
        let rows = client.query(query, &[&table.schema, &table.name]).await?;

        let columns: Vec<ColumnInfo> = rows
            .iter()
            .map(|row| {
                let default: Option<String> = row.get(5);
                let identity: Option<String> = row.get(6);
                let serial = default.as_deref().is_some_and(|d| d.starts_with("nextval("));
                ColumnInfo {
                    name: row.get(0),
                    type_name: row.get(1),
                    element_type: row.get(2),
                    array_dims: row.get::<_, i32>(3).max(0) as u32,
                    nullable: row.get(4),
                    has_default: default.is_some() && !serial,
                    auto_increment: serial || identity.as_deref() == Some("YES"),
                    char_length: row.get(7),
                    numeric_precision: row.get(8),
                    numeric_scale: row.get(9),
                }
            })
            .collect();

        debug!("Loaded {} columns for {}", columns.len(), table);
        Ok(columns)
    }

    async fn list_constraints(&self, table: &TableRef) -> Result<Vec<ConstraintInfo>> {
        let client = self.client("getting connection for list_constraints").await?;

        let keys = r#"
            SELECT k.column_name::text, t.constraint_type::text
            FROM information_schema.table_constraints t
            JOIN information_schema.key_column_usage k
              ON t.constraint_schema = k.constraint_schema
             AND t.constraint_name = k.constraint_name
             AND t.table_name = k.table_name
            WHERE t.table_schema = $1 AND t.table_name = $2
            ORDER BY t.constraint_type, t.constraint_name, k.ordinal_position
        "#;
        let checks = r#"
            SELECT u.column_name::text, t.constraint_type::text
            FROM information_schema.table_constraints t
            JOIN information_schema.constraint_column_usage u
              ON t.constraint_schema = u.constraint_schema
             AND t.constraint_name = u.constraint_name
            WHERE t.table_schema = $1 AND t.table_name = $2
              AND t.constraint_type = 'CHECK'
            ORDER BY t.constraint_name, u.column_name
        "#;

        let mut constraints = Vec::new();
        for query in [keys, checks] {
            let rows = client.query(query, &[&table.schema, &table.name]).await?;
            constraints.extend(
                rows.iter()
                    .map(|row| ConstraintInfo::new(row.get::<_, String>(0), row.get::<_, String>(1))),
            );
        }
        Ok(constraints)
    }

    async fn list_foreign_keys(&self, table: &TableRef) -> Result<Vec<ForeignKeyInfo>> {
        let client = self.client("getting connection for list_foreign_keys").await?;

        let query = r#"
            SELECT
                c.conname::text,
                rn.nspname::text,
                rt.relname::text,
                array_agg(a.attname::text ORDER BY k.ord),
                array_agg(ra.attname::text ORDER BY k.ord)
            FROM pg_catalog.pg_constraint c
            JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
            JOIN pg_catalog.pg_class rt ON rt.oid = c.confrelid
            JOIN pg_catalog.pg_namespace rn ON rn.oid = rt.relnamespace
            CROSS JOIN LATERAL unnest(c.conkey, c.confkey) WITH ORDINALITY AS k(attnum, refnum, ord)
            JOIN pg_catalog.pg_attribute a ON a.attrelid = c.conrelid AND a.attnum = k.attnum
            JOIN pg_catalog.pg_attribute ra ON ra.attrelid = c.confrelid AND ra.attnum = k.refnum
            WHERE c.contype = 'f' AND n.nspname = $1 AND t.relname = $2
            GROUP BY c.conname, rn.nspname, rt.relname
            ORDER BY c.conname
        "#;
        let rows = client.query(query, &[&table.schema, &table.name]).await?;

        let fks: Vec<ForeignKeyInfo> = rows
            .iter()
            .map(|row| ForeignKeyInfo {
                name: row.get(0),
                ref_table: TableRef::new(row.get::<_, String>(1), row.get::<_, String>(2)),
                columns: row.get(3),
                ref_columns: row.get(4),
            })
            .collect();

        debug!("Loaded {} foreign keys for {}", fks.len(), table);
        Ok(fks)
    }

    async fn row_count(&self, table: &TableRef) -> Result<i64> {
        let client = self.client("getting connection for row_count").await?;
        let query = format!("SELECT COUNT(*) FROM {}", qualify(table));
        let row = client.query_one(query.as_str(), &[]).await?;
        Ok(row.get(0))
    }

    fn stream_rows(&self, table: &TableRef, batch_size: usize) -> mpsc::Receiver<Result<RowBatch>> {
        let (tx, rx) = mpsc::channel(4);
        let pool = self.pool.clone();
        let table = table.clone();

        tokio::spawn(async move {
            if let Err(e) = stream_rows_internal(pool, &table, batch_size.max(1), &tx).await {
                let _ = tx.send(Err(e)).await;
            }
        });

        rx
    }
}

async fn stream_rows_internal(
    pool: Pool,
    table: &TableRef,
    batch_size: usize,
    tx: &mpsc::Sender<Result<RowBatch>>,
) -> Result<()> {
    let client = pool
        .get()
        .await
        .map_err(|e| MigrateError::pool(e, "getting connection for stream_rows"))?;

    let names = client
        .query(
            "SELECT column_name::text FROM information_schema.columns \
             WHERE table_schema = $1 AND table_name = $2 ORDER BY ordinal_position",
            &[&table.schema, &table.name],
        )
        .await?;
    let columns: Arc<Vec<String>> = Arc::new(names.iter().map(|r| r.get::<_, String>(0)).collect());
    if columns.is_empty() {
        return Err(MigrateError::conversion(table.to_string(), "relation has no columns"));
    }

    let sql = build_select_query(table, &columns);
    let stream = client.query_raw(sql.as_str(), Vec::<String>::new()).await?;
    futures::pin_mut!(stream);

    let mut rows: Vec<SourceRow> = Vec::with_capacity(batch_size);
    let mut total = 0usize;
    while let Some(row) = stream.next().await {
        let row = row?;
        rows.push(decode_row(&row, columns.len()));
        total += 1;
        if rows.len() >= batch_size {
            let batch = RowBatch::new(columns.clone(), std::mem::take(&mut rows));
            if tx.send(Ok(batch)).await.is_err() {
                return Ok(());
            }
        }
    }

    debug!("{}: finished reading {} rows", table, total);
    let _ = tx.send(Ok(RowBatch::new(columns, rows).mark_final())).await;
    Ok(())
}

fn decode_row(row: &tokio_postgres::Row, width: usize) -> SourceRow {
    (0..width)
        .map(|i| {
            row.try_get::<_, Option<String>>(i)
                .map(RawValue::from)
                .map_err(|e| format!("column {}: {}", i, e))
        })
        .collect()
}

/// `SELECT "a"::text, ... FROM "schema"."table"`.
fn build_select_query(table: &TableRef, columns: &[String]) -> String {
    let cols = columns
        .iter()
        .map(|c| format!("{}::text", quote_ident(c)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("SELECT {} FROM {}", cols, qualify(table))
}

fn qualify(table: &TableRef) -> String {
    format!("{}.{}", quote_ident(&table.schema), quote_ident(&table.name))
}

/// Quote a PostgreSQL identifier.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("orders"), "\"orders\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_build_select_query() {
        let table = TableRef::new("sales", "Orders");
        let sql = build_select_query(&table, &["id".to_string(), "tags".to_string()]);
        assert_eq!(sql, r#"SELECT "id"::text, "tags"::text FROM "sales"."Orders""#);
    }
}
