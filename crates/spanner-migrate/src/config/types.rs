//! Configuration type definitions with auto-tuning based on system resources.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sysinfo::System;
use tracing::info;

use crate::conv::{SampleLimits, DEFAULT_SAMPLE_BYTES, DEFAULT_SAMPLE_ROWS};
use crate::ddl::TypeFamily;

/// System resource information for auto-tuning.
#[derive(Debug, Clone)]
pub struct SystemResources {
    /// Total RAM in GB.
    pub total_memory_gb: f64,
    /// Number of CPU cores.
    pub cpu_cores: usize,
}

impl SystemResources {
    /// Detect system resources.
    pub fn detect() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu();

        Self {
            total_memory_gb: sys.total_memory() as f64 / (1024.0 * 1024.0 * 1024.0),
            cpu_cores: sys.cpus().len().max(1),
        }
    }

    /// Log detected system resources.
    pub fn log(&self) {
        info!(
            "System resources: {:.1} GB RAM, {} CPU cores",
            self.total_memory_gb, self.cpu_cores
        );
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration.
    pub source: SourceConfig,

    /// Schema and data conversion behaviour.
    #[serde(default)]
    pub conversion: ConversionConfig,

    /// Output files.
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Apply auto-tuned defaults based on system resources.
    /// Only fills in values that weren't explicitly set in the config file.
    pub fn with_auto_tuning(mut self) -> Self {
        let resources = SystemResources::detect();
        resources.log();
        self.conversion = self.conversion.with_auto_tuning(&resources);
        self
    }
}

/// Source database configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Database type: `mysql` or `postgres`.
    pub r#type: String,

    /// Database host.
    pub host: String,

    /// Database port (default: 3306 for MySQL, 5432 for PostgreSQL).
    #[serde(default)]
    pub port: Option<u16>,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// PostgreSQL schema to read; all user schemas when unset. MySQL reads
    /// the configured database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// SSL mode: disable, require, verify-ca or verify-full.
    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

impl SourceConfig {
    /// Effective port, falling back to the dialect default.
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| {
            if self.r#type.eq_ignore_ascii_case("mysql") || self.r#type.eq_ignore_ascii_case("mariadb") {
                3306
            } else {
                5432
            }
        })
    }
}

/// Conversion behaviour.
/// Performance-related fields use Option<T> to distinguish between
/// "not set" (use auto-tuned default) and "explicitly set" (use provided value).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// Tables converted concurrently. Auto-tuned from CPU cores if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Rows per streamed batch. Auto-tuned from RAM if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,

    /// Source connection pool size. Auto-tuned from workers if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<usize>,

    /// Maximum number of sampled bad rows.
    #[serde(default = "default_sample_rows")]
    pub bad_row_sample_limit: usize,

    /// Byte budget for sampled bad rows.
    #[serde(default = "default_sample_bytes")]
    pub bad_row_sample_bytes: usize,

    /// Resolve interleaving after the schema is built.
    #[serde(default = "default_true")]
    pub interleave: bool,

    /// Offset applied to date-times that carry no zone.
    #[serde(default)]
    pub timezone_offset_minutes: i32,

    /// Glob patterns of tables to convert; all tables when empty.
    #[serde(default)]
    pub include_tables: Vec<String>,

    /// Glob patterns of tables to leave out.
    #[serde(default)]
    pub exclude_tables: Vec<String>,

    /// Source type name to target family, applied to every matching column.
    #[serde(default)]
    pub type_overrides: BTreeMap<String, TypeFamily>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            workers: None,
            batch_size: None,
            max_connections: None,
            bad_row_sample_limit: DEFAULT_SAMPLE_ROWS,
            bad_row_sample_bytes: DEFAULT_SAMPLE_BYTES,
            interleave: true,
            timezone_offset_minutes: 0,
            include_tables: Vec::new(),
            exclude_tables: Vec::new(),
            type_overrides: BTreeMap::new(),
        }
    }
}

impl ConversionConfig {
    /// Apply auto-tuned defaults based on system resources.
    /// Only fills in values that are None (not explicitly set).
    pub fn with_auto_tuning(mut self, resources: &SystemResources) -> Self {
        let ram_gb = resources.total_memory_gb;
        let cores = resources.cpu_cores;

        // Workers: cores - 2, between 1 and 16
        let workers = *self
            .workers
            .get_or_insert_with(|| cores.saturating_sub(2).clamp(1, 16));

        // Batch size: 1K rows, +1K per 4GB of RAM, cap at 10K
        self.batch_size.get_or_insert_with(|| {
            (1_000 + (ram_gb / 4.0) as usize * 1_000).clamp(1_000, 10_000)
        });

        // One connection per streaming table plus one for catalog queries
        self.max_connections
            .get_or_insert_with(|| (workers + 1).clamp(2, 32));

        info!(
            "Auto-tuned config: workers={}, batch_size={}, max_connections={}",
            self.get_workers(),
            self.get_batch_size(),
            self.get_max_connections(),
        );

        self
    }

    pub fn get_workers(&self) -> usize {
        self.workers.unwrap_or(1)
    }

    pub fn get_batch_size(&self) -> usize {
        self.batch_size.unwrap_or(crate::core::DEFAULT_BATCH_SIZE)
    }

    pub fn get_max_connections(&self) -> usize {
        self.max_connections.unwrap_or(4)
    }

    pub fn sample_limits(&self) -> SampleLimits {
        SampleLimits {
            rows: self.bad_row_sample_limit,
            bytes: self.bad_row_sample_bytes,
        }
    }
}

/// Output file locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Session file holding the schema model between commands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_file: Option<PathBuf>,

    /// JSON-lines file receiving converted rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows_file: Option<PathBuf>,

    /// Column edits applied before data conversion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edits_file: Option<PathBuf>,
}

fn default_ssl_mode() -> String {
    "disable".to_string()
}

fn default_sample_rows() -> usize {
    DEFAULT_SAMPLE_ROWS
}

fn default_sample_bytes() -> usize {
    DEFAULT_SAMPLE_BYTES
}

fn default_true() -> bool {
    true
}
