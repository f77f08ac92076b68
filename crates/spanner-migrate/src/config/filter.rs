//! Table include/exclude filtering.

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::error::{MigrateError, Result};

/// Selects tables by glob patterns (`*`, `?`) over their source names.
///
/// A table is selected when it matches an include pattern (or there are
/// none) and matches no exclude pattern.
#[derive(Debug, Clone, Default)]
pub struct TableFilter {
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl TableFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: build_set(include)?,
            exclude: build_set(exclude)?,
        })
    }

    pub fn matches(&self, table: &str) -> bool {
        let included = self.include.as_ref().map_or(true, |set| set.is_match(table));
        let excluded = self.exclude.as_ref().is_some_and(|set| set.is_match(table));
        included && !excluded
    }
}

fn build_set(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| {
            MigrateError::Config(format!("Invalid table pattern '{}': {}", pattern, e))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map(Some)
        .map_err(|e| MigrateError::Config(format!("Invalid table patterns: {}", e)))
}
