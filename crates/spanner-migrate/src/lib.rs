//! # spanner-migrate
//!
//! Schema and data conversion from MySQL and PostgreSQL to Cloud Spanner.
//!
//! The library builds an in-memory model of the target schema from a source
//! catalog, keeps a two-way correspondence between source and target names,
//! and converts rows into typed target values:
//!
//! - **Type mapping** per source dialect, with issues recorded for lossy choices
//! - **Key extraction** with synthetic primary keys for keyless tables
//! - **Interleaving** of child tables whose key extends a parent's key
//! - **Schema edits** (remove, rename, primary key, retype, not null)
//! - **Data conversion** with bad-row sampling and parallel table streams
//!
//! ## Example
//!
//! ```rust,no_run
//! use spanner_migrate::{Config, Orchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> spanner_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?.with_auto_tuning();
//!     let orchestrator = Orchestrator::new(config).await?;
//!     let result = orchestrator.run(&CancellationToken::new()).await?;
//!     println!("Converted {} rows", result.data.good_rows);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod conv;
pub mod core;
pub mod ddl;
pub mod dialect;
pub mod drivers;
pub mod edit;
pub mod error;
pub mod extract;
pub mod interleave;
pub mod orchestrator;
pub mod target;
pub mod transfer;

// Re-exports for convenient access
pub use config::{Config, ConversionConfig, OutputConfig, SourceConfig};
pub use conv::{Conv, Rating, SchemaIssue};
pub use crate::core::{RawValue, SourceReader, SpannerValue, TableRef, TypeMapper};
pub use ddl::{CreateTable, SpannerType, TypeFamily};
pub use dialect::{SourceDialect, TypeCatalog};
pub use edit::{apply_column_edits, apply_global_type_map, ColumnEdit};
pub use error::{MigrateError, Result};
pub use extract::build_schema;
pub use interleave::{check_interleaving, resolve_interleaving, InterleaveStatus};
pub use orchestrator::{HealthCheckResult, Orchestrator, RunResult};
pub use target::{JsonLinesSink, MemorySink, RowSink};
pub use transfer::{run_data_conversion, DataOptions, DataReport};
