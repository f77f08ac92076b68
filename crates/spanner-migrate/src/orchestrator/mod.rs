//! Conversion orchestrator - main workflow coordinator.
//!
//! Runs the phases in order: schema model, interleaving, edits, data. Each
//! mutating phase ends with a model invariant check, and the session is
//! saved atomically once the run is over.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::conv::{Conv, Rating, TableSummary};
use crate::core::traits::SourceReader;
use crate::drivers::SourceImpl;
use crate::edit::{apply_edit_file, apply_global_type_map, load_edit_file};
use crate::error::{MigrateError, Result};
use crate::extract::{build_schema, SchemaOptions};
use crate::interleave::resolve_interleaving;
use crate::target::{JsonLinesSink, MemorySink};
use crate::transfer::{run_data_conversion, DataOptions, DataReport};

/// Conversion orchestrator.
pub struct Orchestrator<S = SourceImpl> {
    config: Config,
    session_file: Option<PathBuf>,
    source: S,
}

/// Result of a conversion run.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    /// Unique run identifier.
    pub run_id: String,

    /// `completed`, `completed_with_errors` or `cancelled`.
    pub status: String,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,

    pub schema_rating: Rating,
    pub data_rating: Rating,

    /// Per-table schema summary in processing order.
    pub tables: Vec<TableSummary>,

    /// Tables left out because their metadata could not be read.
    pub skipped_tables: Vec<String>,

    /// Tables interleaved in a parent.
    pub interleaved: usize,

    /// Unexpected-input events seen during the run.
    pub unexpected: i64,

    pub data: DataReport,
}

impl RunResult {
    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn is_cancelled(&self) -> bool {
        self.data.cancelled
    }
}

/// Result of a source connectivity check.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub dialect: String,
    pub source_connected: bool,
    pub source_latency_ms: u64,
    pub source_error: Option<String>,
    pub healthy: bool,
}

impl Orchestrator<SourceImpl> {
    /// Connect to the configured source.
    pub async fn new(config: Config) -> Result<Self> {
        let max_conns = config.conversion.get_max_connections();
        let source = SourceImpl::connect(&config.source, max_conns).await?;
        Ok(Self::with_source(config, source))
    }

    /// Connect to the source and time a trivial query. Never fails; the
    /// outcome is in the result.
    pub async fn health_check(config: &Config) -> HealthCheckResult {
        let start = Instant::now();
        let outcome: Result<()> = async {
            let source = SourceImpl::connect(&config.source, 1).await?;
            source.health_check().await
        }
        .await;

        HealthCheckResult {
            dialect: config.source.r#type.clone(),
            source_connected: outcome.is_ok(),
            source_latency_ms: start.elapsed().as_millis() as u64,
            healthy: outcome.is_ok(),
            source_error: outcome.err().map(|e| e.to_string()),
        }
    }
}

impl<S: SourceReader> Orchestrator<S> {
    /// Create an orchestrator over an already connected source.
    pub fn with_source(config: Config, source: S) -> Self {
        let session_file = config.output.session_file.clone();
        Self {
            config,
            session_file,
            source,
        }
    }

    /// Override the session file from the configuration.
    pub fn with_session_file(mut self, path: PathBuf) -> Self {
        self.session_file = Some(path);
        self
    }

    pub fn session_file(&self) -> Option<&Path> {
        self.session_file.as_deref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build the schema model, apply type overrides and interleave.
    pub async fn build_schema(&self) -> Result<Conv> {
        let conversion = &self.config.conversion;
        let options = SchemaOptions {
            filter: self.config.table_filter()?,
            utc_offset_minutes: conversion.timezone_offset_minutes,
            sample_limits: conversion.sample_limits(),
        };
        let mut conv = build_schema(&self.source, &options).await?;

        if !conversion.type_overrides.is_empty() {
            apply_global_type_map(&mut conv, &conversion.type_overrides)?;
        }
        conv.check_invariants()?;

        if conversion.interleave {
            resolve_interleaving(&mut conv)?;
        }

        Ok(conv)
    }

    /// Apply the configured edits file, if any.
    pub fn apply_configured_edits(&self, conv: &mut Conv) -> Result<()> {
        if let Some(path) = &self.config.output.edits_file {
            apply_edits_from(conv, path)?;
        }
        Ok(())
    }

    /// Convert every table's rows into the configured sink.
    ///
    /// Rows go to `output.rows_file` as JSON lines when set; otherwise they
    /// are converted and counted but not kept.
    pub async fn convert_data(&self, conv: &mut Conv, cancel: &CancellationToken) -> Result<DataReport> {
        let options = DataOptions {
            workers: self.config.conversion.get_workers(),
            batch_size: self.config.conversion.get_batch_size(),
        };

        match &self.config.output.rows_file {
            Some(path) => {
                let sink = JsonLinesSink::create(path).await?;
                run_data_conversion(conv, &self.source, &sink, &options, cancel).await
            }
            None => {
                let sink = MemorySink::new();
                run_data_conversion(conv, &self.source, &sink, &options, cancel).await
            }
        }
    }

    /// Save the session to the session file, if one is set.
    pub fn save_session(&self, conv: &Conv) -> Result<()> {
        if let Some(path) = &self.session_file {
            conv.save(path)?;
            info!("Saved session to {}", path.display());
        }
        Ok(())
    }

    /// Run every phase end to end.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunResult> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        info!("Starting conversion run: {}", run_id);

        let mut conv = self.build_schema().await?;
        self.apply_configured_edits(&mut conv)?;

        if cancel.is_cancelled() {
            return Err(MigrateError::Cancelled);
        }
        let data = self.convert_data(&mut conv, cancel).await?;
        self.save_session(&conv)?;

        let completed_at = Utc::now();
        let result = summarize(run_id, started_at, completed_at, &conv, data);
        if result.is_cancelled() {
            warn!("Run {} cancelled", result.run_id);
        } else {
            info!(
                "Run {} {}: schema {}, data {}",
                result.run_id,
                result.status,
                result.schema_rating.as_str(),
                result.data_rating.as_str()
            );
        }
        Ok(result)
    }
}

/// Load an edits file and apply it, checking the model afterwards.
pub fn apply_edits_from(conv: &mut Conv, path: &Path) -> Result<()> {
    info!("Applying edits from {}", path.display());
    let edits = load_edit_file(path)?;
    apply_edit_file(conv, &edits)?;
    conv.check_invariants()
}

fn summarize(
    run_id: String,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    conv: &Conv,
    data: DataReport,
) -> RunResult {
    let status = if data.cancelled {
        "cancelled"
    } else if !data.failed_tables.is_empty() || data.bad_rows > 0 {
        "completed_with_errors"
    } else {
        "completed"
    };

    RunResult {
        run_id,
        status: status.to_string(),
        started_at,
        completed_at,
        duration_seconds: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
        schema_rating: conv.schema_rating(),
        data_rating: conv.data_rating(),
        tables: conv.table_summaries(),
        skipped_tables: conv.introspection_errors.keys().cloned().collect(),
        interleaved: conv.interleave.values().filter(|s| s.possible).count(),
        unexpected: conv.stats.unexpected_total,
        data,
    }
}
