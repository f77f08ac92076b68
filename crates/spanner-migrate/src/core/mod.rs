//! Core abstractions for dialect-agnostic conversion.
//!
//! - [`schema`]: source table/column/constraint types and introspection records
//! - [`value`]: raw source values, converted target values, row batches
//! - [`traits`]: [`SourceReader`] and [`TypeMapper`]
//! - [`identifier`]: SQL quoting and target name sanitisation
//!
//! # Design Patterns
//!
//! - **Strategy**: `TypeMapper` and `SourceReader` are chosen per dialect
//! - **Template Method**: `TypeMapper::map_source_type` wraps the per-dialect
//!   scalar mapping with the shared array rules

pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

#[cfg(test)]
pub(crate) mod testing;

pub use schema::{
    ColumnInfo, ConstraintInfo, ConstraintKind, ForeignKey, ForeignKeyInfo, Ignored, SourceColumn,
    SourceTable, SourceType, TableRef,
};
pub use traits::{SourceReader, TypeMapper, TypeMapping, DEFAULT_BATCH_SIZE};
pub use value::{RawValue, RowBatch, SourceRow, SpannerValue};
