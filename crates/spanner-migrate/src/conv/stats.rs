//! Row statistics and bad-row sampling.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Default number of sampled bad rows.
pub const DEFAULT_SAMPLE_ROWS: usize = 100;

/// Default byte budget for sampled bad rows.
pub const DEFAULT_SAMPLE_BYTES: usize = 10 * 1024 * 1024;

/// Distinct unexpected-input messages kept verbatim.
const MAX_UNEXPECTED_MESSAGES: usize = 100;

/// A rejected source row, stringified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadRow {
    pub table: String,
    pub columns: Vec<String>,
    pub values: Vec<String>,
}

impl BadRow {
    /// Approximate in-memory size, used against the byte budget.
    pub fn size(&self) -> usize {
        self.table.len()
            + self.columns.iter().map(String::len).sum::<usize>()
            + self.values.iter().map(String::len).sum::<usize>()
    }
}

/// Bounds on the bad-row sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleLimits {
    pub rows: usize,
    pub bytes: usize,
}

impl Default for SampleLimits {
    fn default() -> Self {
        Self {
            rows: DEFAULT_SAMPLE_ROWS,
            bytes: DEFAULT_SAMPLE_BYTES,
        }
    }
}

/// Bounded bad-row sample.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadRowSample {
    pub rows: Vec<BadRow>,
    pub bytes: usize,
}

impl BadRowSample {
    /// Keep `row` if both bounds allow it. Returns whether it was kept.
    pub fn collect(&mut self, limits: SampleLimits, row: BadRow) -> bool {
        let size = row.size();
        if self.rows.len() >= limits.rows || self.bytes + size > limits.bytes {
            return false;
        }
        self.bytes += size;
        self.rows.push(row);
        true
    }
}

/// Statistics gathered while converting one table.
#[derive(Debug, Clone, Default)]
pub struct TableStats {
    pub good_rows: i64,
    pub bad_rows: i64,
    pub sample: BadRowSample,
}

/// Run-wide conversion statistics, keyed by source table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Row counts collected before data conversion.
    pub rows: BTreeMap<String, i64>,
    pub good_rows: BTreeMap<String, i64>,
    pub bad_rows: BTreeMap<String, i64>,
    pub sample: BadRowSample,
    /// First distinct unexpected-input messages with occurrence counts.
    pub unexpected: BTreeMap<String, i64>,
    pub unexpected_total: i64,
}

impl ConversionStats {
    pub fn record_unexpected(&mut self, msg: String) {
        self.unexpected_total += 1;
        if let Some(count) = self.unexpected.get_mut(&msg) {
            *count += 1;
        } else if self.unexpected.len() < MAX_UNEXPECTED_MESSAGES {
            self.unexpected.insert(msg, 1);
        }
    }

    pub fn add_bad_rows(&mut self, table: &str, n: i64) {
        *self.bad_rows.entry(table.to_string()).or_insert(0) += n;
    }

    pub fn add_good_rows(&mut self, table: &str, n: i64) {
        *self.good_rows.entry(table.to_string()).or_insert(0) += n;
    }

    /// Fold one table's statistics into the run totals.
    ///
    /// Samples are re-checked against the run-wide limits, so folding tables
    /// in a fixed order keeps the sample deterministic.
    pub fn fold(&mut self, table: &str, stats: TableStats, limits: SampleLimits) {
        self.add_good_rows(table, stats.good_rows);
        self.add_bad_rows(table, stats.bad_rows);
        for row in stats.sample.rows {
            if !self.sample.collect(limits, row) {
                break;
            }
        }
    }

    /// Forget the good and bad rows recorded for `table`, including its
    /// sampled bad rows, before the table is converted again.
    pub fn reset_table(&mut self, table: &str) {
        self.good_rows.remove(table);
        self.bad_rows.remove(table);
        self.sample.rows.retain(|row| row.table != table);
        self.sample.bytes = self.sample.rows.iter().map(BadRow::size).sum();
    }

    pub fn total_rows(&self) -> i64 {
        self.rows.values().sum()
    }

    pub fn total_good_rows(&self) -> i64 {
        self.good_rows.values().sum()
    }

    pub fn total_bad_rows(&self) -> i64 {
        self.bad_rows.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_bad_row(value: &str) -> BadRow {
        BadRow {
            table: "t".to_string(),
            columns: vec!["c".to_string()],
            values: vec![value.to_string()],
        }
    }

    #[test]
    fn test_sample_respects_row_limit() {
        let limits = SampleLimits { rows: 2, bytes: 1024 };
        let mut sample = BadRowSample::default();
        assert!(sample.collect(limits, make_bad_row("a")));
        assert!(sample.collect(limits, make_bad_row("b")));
        assert!(!sample.collect(limits, make_bad_row("c")));
        assert_eq!(sample.rows.len(), 2);
    }

    #[test]
    fn test_sample_respects_byte_limit() {
        let limits = SampleLimits { rows: 100, bytes: 20 };
        let mut sample = BadRowSample::default();
        assert!(sample.collect(limits, make_bad_row("0123456789")));
        assert!(!sample.collect(limits, make_bad_row("0123456789")));
        assert!(sample.collect(limits, make_bad_row("x")));
        assert!(sample.bytes <= 20);
    }

    #[test]
    fn test_fold_accumulates() {
        let limits = SampleLimits::default();
        let mut stats = ConversionStats::default();
        let mut table = TableStats {
            good_rows: 3,
            bad_rows: 1,
            ..Default::default()
        };
        table.sample.collect(limits, make_bad_row("bad"));

        stats.fold("t", table.clone(), limits);
        stats.fold("t", table, limits);

        assert_eq!(stats.good_rows["t"], 6);
        assert_eq!(stats.bad_rows["t"], 2);
        assert_eq!(stats.sample.rows.len(), 2);
        assert!(stats.unexpected.is_empty());
    }

    #[test]
    fn test_reset_table_keeps_other_tables() {
        let limits = SampleLimits::default();
        let mut stats = ConversionStats::default();
        let mut t = TableStats {
            good_rows: 3,
            bad_rows: 1,
            ..Default::default()
        };
        t.sample.collect(limits, make_bad_row("bad"));
        let mut other_row = make_bad_row("other");
        other_row.table = "u".to_string();
        let mut u = TableStats {
            good_rows: 5,
            bad_rows: 1,
            ..Default::default()
        };
        u.sample.collect(limits, other_row.clone());

        stats.fold("t", t, limits);
        stats.fold("u", u, limits);
        stats.reset_table("t");

        assert!(!stats.good_rows.contains_key("t"));
        assert!(!stats.bad_rows.contains_key("t"));
        assert_eq!(stats.good_rows["u"], 5);
        assert_eq!(stats.sample.rows, vec![other_row.clone()]);
        assert_eq!(stats.sample.bytes, other_row.size());
    }
}
