//! Data conversion pipeline.
//!
//! Tables are converted concurrently by a bounded set of workers. Each worker
//! streams rows from the source, converts them against a read-only view of
//! the schema model and hands good rows to a [`RowSink`]. Per-table
//! statistics and synthetic key sequences are merged back into the model
//! afterwards in snapshot order, so the outcome does not depend on which
//! worker finished first.

pub mod convert;

pub use convert::{
    bit_reverse, convert_value, parse_array_literal, ConversionError, ConvertedRow, TableConverter,
};

use std::time::Instant;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::conv::{BadRow, Conv, SampleLimits, TableSnapshot, TableStats};
use crate::core::traits::{SourceReader, DEFAULT_BATCH_SIZE};
use crate::error::{MigrateError, Result};
use crate::target::RowSink;

/// Tunables for a data conversion run.
#[derive(Debug, Clone)]
pub struct DataOptions {
    /// Tables converted concurrently.
    pub workers: usize,

    /// Rows per streamed batch.
    pub batch_size: usize,
}

impl Default for DataOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Summary of a data conversion run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DataReport {
    pub tables_total: usize,
    pub tables_converted: usize,
    pub failed_tables: Vec<String>,
    pub rows: i64,
    pub good_rows: i64,
    pub bad_rows: i64,
    pub cancelled: bool,
    pub duration_seconds: f64,
}

/// Outcome of converting one table.
#[derive(Debug, Default)]
struct TableOutcome {
    index: usize,
    src_table: String,
    sp_table: Option<String>,
    stats: TableStats,
    sequence: Option<i64>,
    failure: Option<String>,
    sink_error: Option<MigrateError>,
    cancelled: bool,
}

/// Record the source row count of every table in the model.
///
/// A count that cannot be read is reported as unexpected and left at zero.
pub async fn collect_row_counts<S>(conv: &mut Conv, source: &S)
where
    S: SourceReader + ?Sized,
{
    for snapshot in conv.tables.clone() {
        let count = match source.row_count(&snapshot.table_ref).await {
            Ok(n) => n,
            Err(e) => {
                conv.unexpected(format!(
                    "Couldn't get number of rows for table {}: {}",
                    snapshot.src_name, e
                ));
                0
            }
        };
        conv.stats.rows.insert(snapshot.src_name, count);
    }
}

/// Convert the rows of every table in the model and write them to `sink`.
///
/// Bad rows are counted and sampled, never fatal. A table that cannot be
/// read is recorded as failed and the run continues. A sink error aborts
/// the run once the statistics gathered so far have been merged.
pub async fn run_data_conversion<S, K>(
    conv: &mut Conv,
    source: &S,
    sink: &K,
    options: &DataOptions,
    cancel: &CancellationToken,
) -> Result<DataReport>
where
    S: SourceReader + ?Sized,
    K: RowSink + ?Sized,
{
    info!("Phase 3: Converting data");
    let start = Instant::now();

    collect_row_counts(conv, source).await;
    for snapshot in &conv.tables {
        conv.stats.reset_table(&snapshot.src_name);
    }

    let workers = options.workers.max(1);
    let batch_size = options.batch_size.max(1);
    let limits = conv.sample_limits;
    info!(
        "Converting {} tables ({} rows) with {} workers",
        conv.tables.len(),
        conv.stats.total_rows(),
        workers
    );

    let mut outcomes: Vec<TableOutcome> = {
        let view: &Conv = conv;
        stream::iter(view.tables.iter().enumerate())
            .map(|(index, snapshot)| {
                convert_table(view, source, sink, index, snapshot, batch_size, limits, cancel)
            })
            .buffer_unordered(workers)
            .collect()
            .await
    };
    outcomes.sort_by_key(|o| o.index);

    let mut report = DataReport {
        tables_total: outcomes.len(),
        ..Default::default()
    };
    let mut sink_error = None;

    for outcome in outcomes {
        if let (Some(sp_table), Some(seq)) = (&outcome.sp_table, outcome.sequence) {
            if let Some(key) = conv.synthetic_pkeys.get_mut(sp_table) {
                key.sequence = seq;
            }
        }
        conv.stats.fold(&outcome.src_table, outcome.stats, limits);

        if outcome.cancelled {
            report.cancelled = true;
        } else if let Some(msg) = outcome.failure {
            conv.unexpected(msg);
            report.failed_tables.push(outcome.src_table);
        } else if outcome.sink_error.is_none() {
            report.tables_converted += 1;
        }
        if sink_error.is_none() {
            sink_error = outcome.sink_error;
        }
    }

    if let Some(e) = sink_error {
        return Err(e);
    }
    sink.flush().await?;

    report.rows = conv.stats.total_rows();
    report.good_rows = conv.stats.total_good_rows();
    report.bad_rows = conv.stats.total_bad_rows();
    report.duration_seconds = start.elapsed().as_secs_f64();

    if report.cancelled {
        warn!("Cancellation requested, data conversion stopped early");
    }
    info!(
        "Data conversion finished: {} good rows, {} bad rows, {} failed tables in {:.2}s",
        report.good_rows,
        report.bad_rows,
        report.failed_tables.len(),
        report.duration_seconds
    );
    Ok(report)
}

#[allow(clippy::too_many_arguments)]
async fn convert_table<S, K>(
    conv: &Conv,
    source: &S,
    sink: &K,
    index: usize,
    snapshot: &TableSnapshot,
    batch_size: usize,
    limits: SampleLimits,
    cancel: &CancellationToken,
) -> TableOutcome
where
    S: SourceReader + ?Sized,
    K: RowSink + ?Sized,
{
    let src_table = snapshot.src_name.as_str();
    let mut outcome = TableOutcome {
        index,
        src_table: src_table.to_string(),
        ..Default::default()
    };

    if cancel.is_cancelled() {
        debug!("{}: skipped, cancellation requested", src_table);
        outcome.cancelled = true;
        return outcome;
    }

    let Some(sp_table) = conv.relation.spanner_table(src_table) else {
        outcome.failure = Some(format!("Table {} is not in the schema", src_table));
        return outcome;
    };
    outcome.sp_table = Some(sp_table.to_string());
    let mut seq = conv.synthetic_pkeys.get(sp_table).map(|k| k.sequence).unwrap_or(0);

    let start = Instant::now();
    let mut rx = source.stream_rows(&snapshot.table_ref, batch_size);
    let mut converter: Option<TableConverter> = None;

    'batches: loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                outcome.cancelled = true;
                break;
            }
            next = rx.recv() => next,
        };
        let batch = match next {
            Some(Ok(batch)) => batch,
            Some(Err(e)) => {
                outcome.failure = Some(format!("Couldn't get data for table {}: {}", src_table, e));
                break;
            }
            None => break,
        };

        if converter.is_none() {
            match TableConverter::new(conv, src_table, &batch.columns) {
                Ok(c) => converter = Some(c),
                Err(e) => {
                    outcome.stats.bad_rows += conv.stats.rows.get(src_table).copied().unwrap_or(0);
                    outcome.failure = Some(format!("Couldn't convert table {}: {}", src_table, e));
                    break;
                }
            }
        }
        let Some(converter) = converter.as_ref() else {
            break;
        };

        for row in &batch.rows {
            let values = match row {
                Ok(values) => values,
                Err(msg) => {
                    debug!("{}: undecodable row: {}", src_table, msg);
                    outcome.stats.bad_rows += 1;
                    continue;
                }
            };

            // Committed only once the row has been written.
            let mut row_seq = seq;
            match converter.convert(values, &mut row_seq) {
                Ok(converted) => {
                    if let Err(e) = sink
                        .write_row(src_table, &converted.table, &converted.columns, &converted.values)
                        .await
                    {
                        outcome.sink_error = Some(e);
                        break 'batches;
                    }
                    seq = row_seq;
                    outcome.stats.good_rows += 1;
                }
                Err(e) => {
                    warn!("{}: bad row: {}", src_table, e);
                    outcome.stats.bad_rows += 1;
                    outcome.stats.sample.collect(
                        limits,
                        BadRow {
                            table: src_table.to_string(),
                            columns: batch.columns.to_vec(),
                            values: values.iter().map(|v| v.to_sample_string()).collect(),
                        },
                    );
                }
            }
        }

        if batch.is_last {
            break;
        }
    }

    if conv.synthetic_pkeys.contains_key(sp_table) {
        outcome.sequence = Some(seq);
    }
    info!(
        "{}: converted {} rows ({} bad) in {:?}",
        src_table,
        outcome.stats.good_rows,
        outcome.stats.bad_rows,
        start.elapsed()
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::ColumnInfo;
    use crate::core::testing::{col, pk, row, MockSource, MockTable};
    use crate::core::value::{RawValue, SpannerValue};
    use crate::extract::{build_schema, SchemaOptions};
    use crate::target::MemorySink;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn orders_table() -> MockTable {
        let mut total = col("total", "numeric", "YES");
        total.numeric_precision = Some(10);
        total.numeric_scale = Some(2);
        let tags = ColumnInfo {
            element_type: Some("text".to_string()),
            array_dims: 1,
            ..col("tags", "ARRAY", "YES")
        };
        MockTable {
            columns: vec![col("id", "integer", "NO"), total, tags],
            constraints: vec![pk("id")],
            rows: vec![row(vec!["1".into(), "19.99".into(), r#"{"a","b"}"#.into()])],
            ..Default::default()
        }
    }

    fn numbers_table(values: &[&str]) -> MockTable {
        MockTable {
            columns: vec![col("n", "bigint", "YES")],
            rows: values.iter().map(|v| row(vec![(*v).into()])).collect(),
            ..Default::default()
        }
    }

    async fn schema(source: &MockSource) -> Conv {
        build_schema(source, &SchemaOptions::default()).await.unwrap()
    }

    fn options(workers: usize) -> DataOptions {
        DataOptions {
            workers,
            batch_size: 2,
        }
    }

    struct FailingSink;

    #[async_trait]
    impl RowSink for FailingSink {
        async fn write_row(
            &self,
            _src_table: &str,
            sp_table: &str,
            _columns: &[String],
            _values: &[SpannerValue],
        ) -> Result<()> {
            Err(MigrateError::conversion(sp_table, "sink closed"))
        }
    }

    /// Accepts a fixed number of rows, then fails every write.
    struct ShortSink {
        capacity: usize,
        inner: MemorySink,
        written: AtomicUsize,
    }

    #[async_trait]
    impl RowSink for ShortSink {
        async fn write_row(
            &self,
            src_table: &str,
            sp_table: &str,
            columns: &[String],
            values: &[SpannerValue],
        ) -> Result<()> {
            if self.written.fetch_add(1, Ordering::SeqCst) >= self.capacity {
                return Err(MigrateError::conversion(sp_table, "sink full"));
            }
            self.inner.write_row(src_table, sp_table, columns, values).await
        }
    }

    #[tokio::test]
    async fn test_orders_end_to_end() {
        let source = MockSource::postgres().table("orders", orders_table());
        let mut conv = schema(&source).await;
        let sink = MemorySink::new();

        let report = run_data_conversion(&mut conv, &source, &sink, &options(1), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.good_rows, 1);
        assert_eq!(report.bad_rows, 0);
        assert_eq!(report.tables_converted, 1);
        assert!(conv.stats.unexpected.is_empty());

        let rows = sink.rows_for("orders").await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].columns, vec!["id", "total", "tags"]);
        assert_eq!(
            rows[0].values,
            vec![
                SpannerValue::Int64(1),
                SpannerValue::Numeric(Decimal::new(1999, 2)),
                SpannerValue::Array(vec![
                    Some(SpannerValue::String("a".into())),
                    Some(SpannerValue::String("b".into())),
                ]),
            ]
        );
    }

    #[tokio::test]
    async fn test_bad_rows_are_counted_and_sampled() {
        let source = MockSource::postgres().table("nums", numbers_table(&["1", "x", "3"]));
        let mut conv = schema(&source).await;
        let sink = MemorySink::new();

        let report = run_data_conversion(&mut conv, &source, &sink, &options(1), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.rows, 3);
        assert_eq!(report.good_rows, 2);
        assert_eq!(report.bad_rows, 1);
        assert_eq!(conv.stats.sample.rows.len(), 1);
        assert_eq!(conv.stats.sample.rows[0].values, vec!["x"]);
        assert_eq!(conv.stats.sample.rows[0].columns, vec!["n"]);
    }

    #[tokio::test]
    async fn test_sample_respects_row_limit() {
        let source = MockSource::postgres().table("nums", numbers_table(&["a", "b", "c", "d"]));
        let mut conv = schema(&source).await;
        conv.sample_limits.rows = 2;

        let report = run_data_conversion(&mut conv, &source, &MemorySink::new(), &options(1), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.bad_rows, 4);
        assert_eq!(conv.stats.sample.rows.len(), 2);
    }

    #[tokio::test]
    async fn test_synthetic_keys_and_sequence_written_back() {
        let source = MockSource::postgres().table("nums", numbers_table(&["1", "2", "x", "4"]));
        let mut conv = schema(&source).await;
        let sink = MemorySink::new();

        run_data_conversion(&mut conv, &source, &sink, &options(1), &CancellationToken::new())
            .await
            .unwrap();

        let keys: Vec<SpannerValue> = sink
            .rows_for("nums")
            .await
            .into_iter()
            .map(|r| r.values.last().cloned().unwrap())
            .collect();
        assert_eq!(
            keys,
            vec![
                SpannerValue::Int64(bit_reverse(0)),
                SpannerValue::Int64(bit_reverse(1)),
                SpannerValue::Int64(bit_reverse(2)),
            ]
        );
        assert_eq!(conv.synthetic_pkeys["nums"].sequence, 3);
    }

    #[tokio::test]
    async fn test_sequence_stops_at_last_written_row() {
        let source = MockSource::postgres().table("nums", numbers_table(&["1", "2", "3", "4"]));
        let mut conv = schema(&source).await;
        let sink = ShortSink {
            capacity: 2,
            inner: MemorySink::new(),
            written: AtomicUsize::new(0),
        };

        let result = run_data_conversion(&mut conv, &source, &sink, &options(1), &CancellationToken::new()).await;

        assert!(matches!(result, Err(MigrateError::Conversion { .. })));
        assert_eq!(sink.inner.rows_for("nums").await.len(), 2);
        assert_eq!(conv.synthetic_pkeys["nums"].sequence, 2);
        assert_eq!(conv.stats.good_rows["nums"], 2);
    }

    #[tokio::test]
    async fn test_rerun_replaces_table_stats() {
        let source = MockSource::postgres().table("nums", numbers_table(&["1", "x", "3"]));
        let mut conv = schema(&source).await;

        for _ in 0..2 {
            let report = run_data_conversion(&mut conv, &source, &MemorySink::new(), &options(1), &CancellationToken::new())
                .await
                .unwrap();
            assert_eq!(report.good_rows, 2);
            assert_eq!(report.bad_rows, 1);
        }

        assert_eq!(conv.stats.good_rows["nums"], 2);
        assert_eq!(conv.stats.bad_rows["nums"], 1);
        assert_eq!(conv.stats.sample.rows.len(), 1);
        assert!(conv.stats.total_good_rows() + conv.stats.total_bad_rows() <= conv.stats.total_rows());
    }

    #[tokio::test]
    async fn test_stream_failure_marks_table_failed() {
        let broken = MockTable {
            fail_stream: true,
            ..numbers_table(&["1"])
        };
        let source = MockSource::postgres()
            .table("broken", broken)
            .table("nums", numbers_table(&["1"]));
        let mut conv = schema(&source).await;

        let report = run_data_conversion(&mut conv, &source, &MemorySink::new(), &options(2), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.failed_tables, vec!["broken"]);
        assert_eq!(report.tables_converted, 1);
        assert_eq!(conv.stats.unexpected_total, 1);
    }

    #[tokio::test]
    async fn test_unknown_source_column_fails_table() {
        let source = MockSource::postgres().table("nums", numbers_table(&["1", "2"]));
        let mut conv = schema(&source).await;
        // The source now streams a column the model has never seen.
        let source = MockSource::postgres().table(
            "nums",
            MockTable {
                columns: vec![col("other", "bigint", "YES")],
                rows: vec![row(vec![RawValue::Int(1)]), row(vec![RawValue::Int(2)])],
                ..Default::default()
            },
        );

        let report = run_data_conversion(&mut conv, &source, &MemorySink::new(), &options(1), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.failed_tables, vec!["nums"]);
        assert_eq!(report.bad_rows, 2);
        assert_eq!(report.good_rows, 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let source = MockSource::postgres().table("nums", numbers_table(&["1", "2"]));
        let mut conv = schema(&source).await;
        let sink = MemorySink::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = run_data_conversion(&mut conv, &source, &sink, &options(1), &cancel)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.tables_converted, 0);
        assert!(sink.rows().await.is_empty());
    }

    #[tokio::test]
    async fn test_sink_error_aborts_after_merge() {
        let source = MockSource::postgres().table("nums", numbers_table(&["1"]));
        let mut conv = schema(&source).await;

        let result = run_data_conversion(&mut conv, &source, &FailingSink, &options(1), &CancellationToken::new()).await;

        assert!(matches!(result, Err(MigrateError::Conversion { .. })));
        assert_eq!(conv.stats.rows["nums"], 1);
    }

    #[tokio::test]
    async fn test_parallel_run_matches_sequential() {
        let source = || {
            MockSource::postgres()
                .table("a", numbers_table(&["1", "x", "3"]))
                .table("b", numbers_table(&["y", "5"]))
                .table("c", numbers_table(&["6", "7", "z", "9"]))
        };

        let seq_source = source();
        let mut sequential = schema(&seq_source).await;
        run_data_conversion(&mut sequential, &seq_source, &MemorySink::new(), &options(1), &CancellationToken::new())
            .await
            .unwrap();

        let par_source = source();
        let mut parallel = schema(&par_source).await;
        run_data_conversion(&mut parallel, &par_source, &MemorySink::new(), &options(3), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(sequential.stats.good_rows, parallel.stats.good_rows);
        assert_eq!(sequential.stats.bad_rows, parallel.stats.bad_rows);
        assert_eq!(sequential.stats.sample, parallel.stats.sample);
        assert_eq!(sequential.synthetic_pkeys, parallel.synthetic_pkeys);
    }

    #[tokio::test]
    async fn test_row_count_failure_is_unexpected() {
        let source = MockSource::postgres().table("nums", numbers_table(&["1"]));
        let mut conv = schema(&source).await;
        let empty = MockSource::postgres();

        collect_row_counts(&mut conv, &empty).await;

        assert_eq!(conv.stats.rows["nums"], 0);
        assert_eq!(conv.stats.unexpected_total, 1);
    }
}
