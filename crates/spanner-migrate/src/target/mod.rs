//! Row sinks for converted data.
//!
//! Converted rows are handed to a [`RowSink`] together with the source and
//! target table names. Writing to a live Spanner database is out of scope;
//! the sinks here keep rows in memory or write them as JSON lines.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tracing::debug;

use crate::core::value::SpannerValue;
use crate::error::Result;

/// Destination for converted rows.
#[async_trait]
pub trait RowSink: Send + Sync {
    /// Write one converted row. Columns and values are parallel.
    async fn write_row(
        &self,
        src_table: &str,
        sp_table: &str,
        columns: &[String],
        values: &[SpannerValue],
    ) -> Result<()>;

    /// Flush buffered rows.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// A row as received by [`MemorySink`].
#[derive(Debug, Clone, PartialEq)]
pub struct WrittenRow {
    pub src_table: String,
    pub sp_table: String,
    pub columns: Vec<String>,
    pub values: Vec<SpannerValue>,
}

/// Collects rows in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    rows: Mutex<Vec<WrittenRow>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows written so far, in arrival order.
    pub async fn rows(&self) -> Vec<WrittenRow> {
        self.rows.lock().await.clone()
    }

    /// Rows written to one target table.
    pub async fn rows_for(&self, sp_table: &str) -> Vec<WrittenRow> {
        self.rows
            .lock()
            .await
            .iter()
            .filter(|r| r.sp_table == sp_table)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RowSink for MemorySink {
    async fn write_row(
        &self,
        src_table: &str,
        sp_table: &str,
        columns: &[String],
        values: &[SpannerValue],
    ) -> Result<()> {
        self.rows.lock().await.push(WrittenRow {
            src_table: src_table.to_string(),
            sp_table: sp_table.to_string(),
            columns: columns.to_vec(),
            values: values.to_vec(),
        });
        Ok(())
    }
}

/// Writes one JSON object per row:
/// `{"table": ..., "columns": [...], "values": [...]}`.
pub struct JsonLinesSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    /// Create (or truncate) the output file.
    pub async fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).await?;
        debug!("Writing converted rows to {}", path.display());
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RowSink for JsonLinesSink {
    async fn write_row(
        &self,
        _src_table: &str,
        sp_table: &str,
        columns: &[String],
        values: &[SpannerValue],
    ) -> Result<()> {
        let line = serde_json::json!({
            "table": sp_table,
            "columns": columns,
            "values": values.iter().map(SpannerValue::to_json).collect::<Vec<_>>(),
        });
        let mut bytes = serde_json::to_vec(&line)?;
        bytes.push(b'\n');
        self.writer.lock().await.write_all(&bytes).await?;
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.writer.lock().await.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|c| c.to_string()).collect()
    }

    #[tokio::test]
    async fn test_memory_sink_filters_by_table() {
        let sink = MemorySink::new();
        sink.write_row("a", "a", &cols(&["id"]), &[SpannerValue::Int64(1)])
            .await
            .unwrap();
        sink.write_row("public.b", "public_b", &cols(&["id"]), &[SpannerValue::Int64(2)])
            .await
            .unwrap();

        assert_eq!(sink.rows().await.len(), 2);
        let b = sink.rows_for("public_b").await;
        assert_eq!(b.len(), 1);
        assert_eq!(b[0].src_table, "public.b");
    }

    #[tokio::test]
    async fn test_json_lines_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.jsonl");
        let sink = JsonLinesSink::create(&path).await.unwrap();
        sink.write_row(
            "orders",
            "orders",
            &cols(&["id", "tags"]),
            &[
                SpannerValue::Int64(1),
                SpannerValue::Array(vec![Some(SpannerValue::String("a".into()))]),
            ],
        )
        .await
        .unwrap();
        sink.flush().await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 1);
        let value: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"table": "orders", "columns": ["id", "tags"], "values": [1, ["a"]]})
        );
    }
}
