//! Core traits for dialect-agnostic conversion.
//!
//! - [`SourceReader`]: catalog introspection and row streaming for a source database
//! - [`TypeMapper`]: per-dialect mapping from source types to target types
//!
//! The engine depends only on these traits; the dialect is chosen once at
//! the start of a run.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::conv::SchemaIssue;
use crate::ddl::{SpannerType, TypeFamily};
use crate::dialect::SourceDialect;
use crate::error::Result;

use super::schema::{ColumnInfo, ConstraintInfo, ForeignKeyInfo, SourceType, TableRef};
use super::value::RowBatch;

/// Default number of rows per streamed batch.
pub const DEFAULT_BATCH_SIZE: usize = 1_000;

/// Read catalog metadata and rows from a source database.
///
/// # Streaming
///
/// [`stream_rows`](SourceReader::stream_rows) returns a channel receiver fed
/// by a background task, so a slow consumer applies backpressure to the
/// scan. Each call owns its own connection; streams are forward-only and not
/// restartable.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Source dialect of this reader.
    fn dialect(&self) -> SourceDialect;

    /// Schema whose tables keep their bare name in the model.
    fn implicit_schema(&self) -> &str;

    /// List user tables, excluding system schemas.
    async fn list_tables(&self) -> Result<Vec<TableRef>>;

    /// List columns of a table in ordinal order.
    async fn list_columns(&self, table: &TableRef) -> Result<Vec<ColumnInfo>>;

    /// List `(column, constraint kind)` rows in key ordinal order.
    async fn list_constraints(&self, table: &TableRef) -> Result<Vec<ConstraintInfo>>;

    /// List foreign keys with positional column correspondence.
    async fn list_foreign_keys(&self, table: &TableRef) -> Result<Vec<ForeignKeyInfo>>;

    /// Count rows in a table.
    async fn row_count(&self, table: &TableRef) -> Result<i64>;

    /// Start streaming rows from a table.
    ///
    /// Returns a receiver that yields `Result<RowBatch>` until the table is
    /// exhausted. An `Err` item ends the stream.
    fn stream_rows(&self, table: &TableRef, batch_size: usize) -> mpsc::Receiver<Result<RowBatch>>;
}

/// Result of mapping a source type to a target type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeMapping {
    /// Target type.
    pub target: SpannerType,
    /// Issues raised by this choice of type.
    pub issues: Vec<SchemaIssue>,
}

impl TypeMapping {
    /// Create a mapping that raises no issues.
    pub fn lossless(target: SpannerType) -> Self {
        Self {
            target,
            issues: Vec::new(),
        }
    }

    /// Create a mapping with an issue.
    pub fn lossy(target: SpannerType, issue: SchemaIssue) -> Self {
        Self {
            target,
            issues: vec![issue],
        }
    }

    pub fn with_issue(mut self, issue: SchemaIssue) -> Self {
        if !self.issues.contains(&issue) {
            self.issues.push(issue);
        }
        self
    }
}

/// Maps source types to target types for one source dialect.
///
/// Implementations are pure: the same input always yields the same mapping,
/// and a mapping never fails. Types that cannot be represented faithfully
/// produce a best-effort type plus issues.
pub trait TypeMapper: Send + Sync {
    /// Source dialect handled by this mapper.
    fn dialect(&self) -> SourceDialect;

    /// Map a scalar source type name.
    ///
    /// `desired` is the family the caller would like; mappers honour it when
    /// they know how to produce it and otherwise fall back to their default.
    fn map_type(&self, type_name: &str, desired: Option<TypeFamily>, mods: &[i64]) -> TypeMapping;

    /// Map a full source type descriptor, including array bounds.
    ///
    /// One array bound maps the element type and marks the result as an
    /// array. More than one bound is never flattened: it becomes
    /// `STRING(MAX)` with [`SchemaIssue::MultiDimensionalArray`].
    fn map_source_type(&self, src: &SourceType, desired: Option<TypeFamily>) -> TypeMapping {
        if src.array_bounds.len() > 1 {
            return TypeMapping::lossy(
                SpannerType::string_max(),
                SchemaIssue::MultiDimensionalArray,
            );
        }

        let mut mapping = self.map_type(&src.name, desired, &src.mods);
        if src.array_bounds.len() == 1 {
            mapping.target = mapping.target.into_array();
        }
        mapping
    }
}
