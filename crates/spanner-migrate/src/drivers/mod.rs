//! Source database drivers.
//!
//! - [`mysql`]: MySQL/MariaDB reader (SQLx)
//! - [`postgres`]: PostgreSQL reader (tokio-postgres + deadpool)
//! - [`common`]: shared utilities (TLS)
//!
//! # Dispatch
//!
//! [`SourceImpl`] wraps the concrete readers in an enum and forwards the
//! [`SourceReader`] methods with a `match`, so the rest of the engine stays
//! generic over `S: SourceReader` without boxing.

pub mod common;
pub mod mysql;
pub mod postgres;

pub use common::SslMode;
pub use mysql::MysqlReader;
pub use postgres::PostgresReader;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::SourceConfig;
use crate::core::schema::{ColumnInfo, ConstraintInfo, ForeignKeyInfo, TableRef};
use crate::core::traits::SourceReader;
use crate::core::value::RowBatch;
use crate::dialect::SourceDialect;
use crate::error::Result;

/// Enum-based static dispatch over the supported source readers.
pub enum SourceImpl {
    Mysql(MysqlReader),
    Postgres(PostgresReader),
}

impl SourceImpl {
    /// Connect to the source named by `config.type`.
    pub async fn connect(config: &SourceConfig, max_conns: usize) -> Result<Self> {
        match config.r#type.parse::<SourceDialect>()? {
            SourceDialect::Mysql => Ok(SourceImpl::Mysql(MysqlReader::new(config, max_conns).await?)),
            SourceDialect::Postgres => Ok(SourceImpl::Postgres(
                PostgresReader::new(config, max_conns).await?,
            )),
        }
    }

    /// Run a trivial query against the source.
    pub async fn health_check(&self) -> Result<()> {
        match self {
            SourceImpl::Mysql(r) => r.test_connection().await,
            SourceImpl::Postgres(r) => r.test_connection().await,
        }
    }
}

#[async_trait]
impl SourceReader for SourceImpl {
    fn dialect(&self) -> SourceDialect {
        match self {
            SourceImpl::Mysql(r) => r.dialect(),
            SourceImpl::Postgres(r) => r.dialect(),
        }
    }

    fn implicit_schema(&self) -> &str {
        match self {
            SourceImpl::Mysql(r) => r.implicit_schema(),
            SourceImpl::Postgres(r) => r.implicit_schema(),
        }
    }

    async fn list_tables(&self) -> Result<Vec<TableRef>> {
        match self {
            SourceImpl::Mysql(r) => r.list_tables().await,
            SourceImpl::Postgres(r) => r.list_tables().await,
        }
    }

    async fn list_columns(&self, table: &TableRef) -> Result<Vec<ColumnInfo>> {
        match self {
            SourceImpl::Mysql(r) => r.list_columns(table).await,
            SourceImpl::Postgres(r) => r.list_columns(table).await,
        }
    }

    async fn list_constraints(&self, table: &TableRef) -> Result<Vec<ConstraintInfo>> {
        match self {
            SourceImpl::Mysql(r) => r.list_constraints(table).await,
            SourceImpl::Postgres(r) => r.list_constraints(table).await,
        }
    }

    async fn list_foreign_keys(&self, table: &TableRef) -> Result<Vec<ForeignKeyInfo>> {
        match self {
            SourceImpl::Mysql(r) => r.list_foreign_keys(table).await,
            SourceImpl::Postgres(r) => r.list_foreign_keys(table).await,
        }
    }

    async fn row_count(&self, table: &TableRef) -> Result<i64> {
        match self {
            SourceImpl::Mysql(r) => r.row_count(table).await,
            SourceImpl::Postgres(r) => r.row_count(table).await,
        }
    }

    fn stream_rows(&self, table: &TableRef, batch_size: usize) -> mpsc::Receiver<Result<RowBatch>> {
        match self {
            SourceImpl::Mysql(r) => r.stream_rows(table, batch_size),
            SourceImpl::Postgres(r) => r.stream_rows(table, batch_size),
        }
    }
}
