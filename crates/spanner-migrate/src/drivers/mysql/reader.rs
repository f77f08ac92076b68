//! MySQL/MariaDB source reader implementation.
//!
//! Implements [`SourceReader`] over INFORMATION_SCHEMA using SQLx for
//! connection pooling. Only the configured database is read; its tables keep
//! their bare names in the schema model.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::SourceConfig;
use crate::core::schema::{ColumnInfo, ConstraintInfo, ForeignKeyInfo, TableRef};
use crate::core::traits::SourceReader;
use crate::core::value::{RawValue, RowBatch, SourceRow};
use crate::dialect::SourceDialect;
use crate::drivers::common::SslMode;
use crate::error::{MigrateError, Result};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// MySQL/MariaDB source reader.
pub struct MysqlReader {
    pool: MySqlPool,
    database: String,
}

impl MysqlReader {
    /// Connect to the configured source and verify the connection.
    pub async fn new(config: &SourceConfig, max_conns: usize) -> Result<Self> {
        let ssl_mode = SslMode::parse(&config.ssl_mode)?;

        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.effective_port())
            .database(&config.database)
            .username(&config.user)
            .password(&config.password)
            .ssl_mode(ssl_mode.mysql());

        let pool = MySqlPoolOptions::new()
            .max_connections(max_conns.max(1) as u32)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| MigrateError::pool(e, "creating MySQL source pool"))?;

        let reader = Self {
            pool,
            database: config.database.clone(),
        };
        reader.test_connection().await?;

        info!(
            "Connected to MySQL source: {}:{}/{}",
            config.host,
            config.effective_port(),
            config.database
        );
        Ok(reader)
    }

    /// Test the database connection.
    pub async fn test_connection(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MigrateError::pool(e, "testing MySQL connection"))?;
        Ok(())
    }
}

#[async_trait]
impl SourceReader for MysqlReader {
    fn dialect(&self) -> SourceDialect {
        SourceDialect::Mysql
    }

    fn implicit_schema(&self) -> &str {
        &self.database
    }

    async fn list_tables(&self) -> Result<Vec<TableRef>> {
        let query = r#"
            SELECT CAST(TABLE_SCHEMA AS CHAR(255)) AS TABLE_SCHEMA,
                   CAST(TABLE_NAME AS CHAR(255)) AS TABLE_NAME
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_TYPE = 'BASE TABLE' AND TABLE_SCHEMA = ?
            ORDER BY TABLE_NAME
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .fetch_all(&self.pool)
            .await?;

        let tables: Vec<TableRef> = rows
            .iter()
            .map(|row| {
                TableRef::new(
                    row.get::<String, _>("TABLE_SCHEMA"),
                    row.get::<String, _>("TABLE_NAME"),
                )
            })
            .collect();
        debug!("Found {} tables", tables.len());
        Ok(tables)
    }

    async fn list_columns(&self, table: &TableRef) -> Result<Vec<ColumnInfo>> {
        let query = r#"
            SELECT
                CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(DATA_TYPE AS CHAR(255)) AS DATA_TYPE,
                CAST(COLUMN_TYPE AS CHAR(255)) AS COLUMN_TYPE,
                CAST(IS_NULLABLE AS CHAR(3)) AS IS_NULLABLE,
                IF(COLUMN_DEFAULT IS NULL, 0, 1) AS has_default,
                IF(EXTRA LIKE '%auto_increment%', 1, 0) AS is_identity,
                CAST(CHARACTER_MAXIMUM_LENGTH AS SIGNED) AS max_length,
                CAST(NUMERIC_PRECISION AS SIGNED) AS num_precision,
                CAST(NUMERIC_SCALE AS SIGNED) AS num_scale
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&table.schema)
            .bind(&table.name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::introspection(table.to_string(), e))?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let data_type: String = row.try_get("DATA_TYPE")?;
            let column_type: String = row.try_get("COLUMN_TYPE")?;
            let (precision, scale) = numeric_mods(
                &data_type,
                &column_type,
                row.try_get("num_precision")?,
                row.try_get("num_scale")?,
            );
            columns.push(ColumnInfo {
                name: row.try_get("COLUMN_NAME")?,
                type_name: data_type,
                element_type: None,
                array_dims: 0,
                nullable: row.try_get("IS_NULLABLE")?,
                has_default: row.try_get::<i64, _>("has_default")? == 1,
                auto_increment: row.try_get::<i64, _>("is_identity")? == 1,
                char_length: row.try_get("max_length")?,
                numeric_precision: precision,
                numeric_scale: scale,
            });
        }

        debug!("Loaded {} columns for {}", columns.len(), table);
        Ok(columns)
    }

    async fn list_constraints(&self, table: &TableRef) -> Result<Vec<ConstraintInfo>> {
        // CAST to CHAR to handle collation differences
        let query = r#"
            SELECT CAST(k.COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                   CAST(t.CONSTRAINT_TYPE AS CHAR(32)) AS CONSTRAINT_TYPE
            FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS t
            JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE k
              ON t.CONSTRAINT_SCHEMA = k.CONSTRAINT_SCHEMA
             AND t.CONSTRAINT_NAME = k.CONSTRAINT_NAME
             AND t.TABLE_NAME = k.TABLE_NAME
            WHERE t.TABLE_SCHEMA = ? AND t.TABLE_NAME = ?
            ORDER BY t.CONSTRAINT_TYPE, t.CONSTRAINT_NAME, k.ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&table.schema)
            .bind(&table.name)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                Ok(ConstraintInfo::new(
                    row.try_get::<String, _>("COLUMN_NAME")?,
                    row.try_get::<String, _>("CONSTRAINT_TYPE")?,
                ))
            })
            .collect()
    }

    async fn list_foreign_keys(&self, table: &TableRef) -> Result<Vec<ForeignKeyInfo>> {
        let query = r#"
            SELECT CAST(CONSTRAINT_NAME AS CHAR(255)) AS CONSTRAINT_NAME,
                   CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                   CAST(REFERENCED_TABLE_SCHEMA AS CHAR(255)) AS REF_SCHEMA,
                   CAST(REFERENCED_TABLE_NAME AS CHAR(255)) AS REF_TABLE,
                   CAST(REFERENCED_COLUMN_NAME AS CHAR(255)) AS REF_COLUMN
            FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
              AND REFERENCED_TABLE_NAME IS NOT NULL
            ORDER BY CONSTRAINT_NAME, ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&table.schema)
            .bind(&table.name)
            .fetch_all(&self.pool)
            .await?;

        let mut fks: Vec<ForeignKeyInfo> = Vec::new();
        for row in rows {
            let name: String = row.try_get("CONSTRAINT_NAME")?;
            let column: String = row.try_get("COLUMN_NAME")?;
            let ref_column: String = row.try_get("REF_COLUMN")?;
            match fks.last_mut() {
                Some(fk) if fk.name == name => {
                    fk.columns.push(column);
                    fk.ref_columns.push(ref_column);
                }
                _ => fks.push(ForeignKeyInfo {
                    name,
                    columns: vec![column],
                    ref_table: TableRef::new(
                        row.try_get::<String, _>("REF_SCHEMA")?,
                        row.try_get::<String, _>("REF_TABLE")?,
                    ),
                    ref_columns: vec![ref_column],
                }),
            }
        }

        debug!("Loaded {} foreign keys for {}", fks.len(), table);
        Ok(fks)
    }

    async fn row_count(&self, table: &TableRef) -> Result<i64> {
        let query = format!("SELECT COUNT(*) FROM {}", qualify(table));
        let count: i64 = sqlx::query_scalar(&query).fetch_one(&self.pool).await?;
        Ok(count)
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
    pool: MySqlPool,
    table: &TableRef,
    batch_size: usize,
    tx: &mpsc::Sender<Result<RowBatch>>,
) -> Result<()> {
    let names: Vec<String> = sqlx::query_scalar(
        "SELECT CAST(COLUMN_NAME AS CHAR(255)) FROM INFORMATION_SCHEMA.COLUMNS \
         WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? ORDER BY ORDINAL_POSITION",
    )
    .bind(&table.schema)
    .bind(&table.name)
    .fetch_all(&pool)
    .await?;
    if names.is_empty() {
        return Err(MigrateError::conversion(table.to_string(), "table has no columns"));
    }
    let columns = Arc::new(names);

    let col_list = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("SELECT {} FROM {}", col_list, qualify(table));

    let mut stream = sqlx::query(&sql).fetch(&pool);
    let mut rows: Vec<SourceRow> = Vec::with_capacity(batch_size);
    let mut total = 0usize;
    while let Some(row) = stream.try_next().await? {
        rows.push(decode_row(&row));
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

/// Precision/scale to keep for a column. `tinyint(1)` carries width 1 so the
/// mapper can treat it as a boolean; only decimals carry numeric modifiers.
fn numeric_mods(
    data_type: &str,
    column_type: &str,
    precision: Option<i64>,
    scale: Option<i64>,
) -> (Option<i64>, Option<i64>) {
    match data_type.to_lowercase().as_str() {
        "tinyint" if column_type.to_lowercase().starts_with("tinyint(1)") => (Some(1), None),
        "decimal" | "numeric" => (precision, scale),
        _ => (None, None),
    }
}

/// Decode one row by the column types the server reports.
fn decode_row(row: &MySqlRow) -> SourceRow {
    row.columns()
        .iter()
        .map(|col| {
            let i = col.ordinal();
            let raw = row.try_get_raw(i).map_err(|e| e.to_string())?;
            if raw.is_null() {
                return Ok(RawValue::Null);
            }
            let type_name = raw.type_info().name().to_uppercase();
            decode_value(row, i, &type_name)
                .map_err(|e| format!("column {} ({}): {}", col.name(), type_name, e))
        })
        .collect()
}

fn decode_value(row: &MySqlRow, i: usize, type_name: &str) -> std::result::Result<RawValue, sqlx::Error> {
    let value = match type_name {
        "BOOLEAN" => RawValue::Bool(row.try_get(i)?),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => RawValue::Int(row.try_get(i)?),
        "YEAR" => RawValue::Int(i64::from(row.try_get_unchecked::<u16, _>(i)?)),
        t if t.ends_with("UNSIGNED") => {
            let v: u64 = row.try_get(i)?;
            i64::try_from(v)
                .map(RawValue::Int)
                .unwrap_or_else(|_| RawValue::Decimal(v.into()))
        }
        "FLOAT" => RawValue::Float(f64::from(row.try_get::<f32, _>(i)?)),
        "DOUBLE" => RawValue::Float(row.try_get(i)?),
        "DECIMAL" => RawValue::Decimal(row.try_get(i)?),
        "DATE" => RawValue::Date(row.try_get(i)?),
        "TIME" => RawValue::Time(row.try_get(i)?),
        "DATETIME" => RawValue::DateTime(row.try_get(i)?),
        "TIMESTAMP" => RawValue::DateTimeTz(row.try_get(i)?),
        "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
        | "GEOMETRY" => RawValue::Bytes(row.try_get(i)?),
        _ => match row.try_get::<String, _>(i) {
            Ok(s) => RawValue::Text(s),
            Err(_) => RawValue::Bytes(row.try_get(i)?),
        },
    };
    Ok(value)
}

fn qualify(table: &TableRef) -> String {
    format!("{}.{}", quote_ident(&table.schema), quote_ident(&table.name))
}

/// Quote a MySQL identifier.
fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("users"), "`users`");
        assert_eq!(quote_ident("my`table"), "`my``table`");
        assert_eq!(qualify(&TableRef::new("shop", "orders")), "`shop`.`orders`");
    }

    #[test]
    fn test_numeric_mods() {
        assert_eq!(numeric_mods("tinyint", "tinyint(1)", Some(3), Some(0)), (Some(1), None));
        assert_eq!(numeric_mods("tinyint", "tinyint(4) unsigned", Some(3), Some(0)), (None, None));
        assert_eq!(numeric_mods("decimal", "decimal(10,2)", Some(10), Some(2)), (Some(10), Some(2)));
        assert_eq!(numeric_mods("int", "int", Some(10), Some(0)), (None, None));
    }
}
