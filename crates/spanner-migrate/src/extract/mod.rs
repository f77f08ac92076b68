//! Constraint extraction and schema model construction.

mod builder;
mod constraints;

pub use builder::{add_source_table, build_schema, SchemaOptions, TableMetadata};
pub(crate) use builder::constraint_issues;
pub use constraints::{extract_constraints, extract_foreign_keys, ExtractedConstraints};
