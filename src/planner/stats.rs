//! Table Statistics
//!
//! Per-table row counts feeding the greedy join ordering. The registry is
//! consulted first; the tabular source's own statistics are the fallback.

use crate::exec::source::{TableStats, TabularSource};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct StatsRegistry {
    by_table: HashMap<String, TableStats>,
}

impl StatsRegistry {
    pub fn new() -> Self {
        StatsRegistry::default()
    }

    pub fn set(&mut self, table: impl Into<String>, stats: TableStats) {
        self.by_table.insert(table.into(), stats);
    }

    pub fn get(&self, table: &str) -> Option<TableStats> {
        self.by_table.get(table).copied()
    }

    /// Registry entry, else the source's own statistics.
    pub fn resolve(&self, table: &str, source: &dyn TabularSource) -> Option<TableStats> {
        self.get(table).or_else(|| source.stats(table))
    }
}
