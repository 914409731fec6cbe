//! Per-table statistics for the query optimizer.
//!
//! [`TableStats`] scans a table twice inside its own read-only transaction:
//! the first pass finds each integer column's value range and the row count,
//! the second fills one histogram per column. The result is a plain value —
//! whoever computes statistics owns them.

use std::collections::HashMap;
use std::sync::Arc;

use crate::buffer::{BufferError, BufferPool};
use crate::datum::{Field, FieldType};
use crate::executor::CompareOp;
use crate::heap::TableScan;
use crate::tx::TransactionId;

use super::histogram::{IntHistogram, StringHistogram};

/// Histogram resolution used for freshly built statistics.
pub const NUM_HIST_BINS: usize = 100;

enum ColumnHistogram {
    Int(IntHistogram),
    Text(StringHistogram),
}

/// Statistics over one table: row count, page count, and a histogram per
/// column.
pub struct TableStats {
    io_cost_per_page: f64,
    num_pages: u32,
    num_tuples: usize,
    histograms: HashMap<usize, ColumnHistogram>,
}

impl TableStats {
    /// Builds statistics for `table_id` by scanning it twice under a fresh
    /// read-only transaction. The transaction is committed (releasing its
    /// page locks) before this returns.
    pub fn build(
        pool: &Arc<BufferPool>,
        table_id: u32,
        io_cost_per_page: f64,
    ) -> Result<Self, BufferError> {
        let file = pool.catalog().file(table_id)?;
        let schema = Arc::clone(file.schema());
        let tid = TransactionId::new();

        let result = (|| {
            let mut scan = TableScan::new(Arc::clone(&file), Arc::clone(pool), tid);

            // Pass 1: integer value ranges and the row count.
            let mut ranges: Vec<Option<(i32, i32)>> = vec![None; schema.len()];
            let mut num_tuples = 0;
            scan.open()?;
            while let Some(tuple) = scan.next()? {
                num_tuples += 1;
                for (i, field) in tuple.fields().enumerate() {
                    if let Field::Int(v) = field {
                        let (min, max) = ranges[i].get_or_insert((*v, *v));
                        *min = (*min).min(*v);
                        *max = (*max).max(*v);
                    }
                }
            }

            let mut histograms = HashMap::new();
            if num_tuples > 0 {
                for i in 0..schema.len() {
                    let histogram = match schema.field_type(i) {
                        FieldType::Int => {
                            let (min, max) =
                                ranges[i].expect("every int column saw a value");
                            ColumnHistogram::Int(IntHistogram::new(NUM_HIST_BINS, min, max))
                        }
                        FieldType::Text => {
                            ColumnHistogram::Text(StringHistogram::new(NUM_HIST_BINS))
                        }
                    };
                    histograms.insert(i, histogram);
                }

                // Pass 2: fill the histograms.
                scan.rewind()?;
                while let Some(tuple) = scan.next()? {
                    for (i, field) in tuple.fields().enumerate() {
                        match (histograms.get_mut(&i), field) {
                            (Some(ColumnHistogram::Int(h)), Field::Int(v)) => h.add_value(*v),
                            (Some(ColumnHistogram::Text(h)), Field::Text(s)) => h.add_value(s),
                            _ => {}
                        }
                    }
                }
            }
            scan.close();

            Ok(Self {
                io_cost_per_page,
                num_pages: file.num_pages(),
                num_tuples,
                histograms,
            })
        })();

        // Release the scan's shared locks whether or not the passes
        // succeeded.
        pool.transaction_complete(tid, true)?;
        result
    }

    /// Estimated cost of a full sequential scan: every page is read once,
    /// resident or not, at twice the configured per-page cost.
    pub fn estimate_scan_cost(&self) -> f64 {
        2.0 * self.num_pages as f64 * self.io_cost_per_page
    }

    /// Number of rows the table held when the statistics were built.
    pub fn num_tuples(&self) -> usize {
        self.num_tuples
    }

    /// Estimated number of rows a predicate with the given selectivity
    /// keeps.
    pub fn estimate_table_cardinality(&self, selectivity: f64) -> usize {
        (self.num_tuples as f64 * selectivity) as usize
    }

    /// Estimates the selectivity of `column op value` against the column's
    /// histogram. An empty table estimates 0.
    pub fn estimate_selectivity(&self, column: usize, op: CompareOp, value: &Field) -> f64 {
        match (self.histograms.get(&column), value) {
            (Some(ColumnHistogram::Int(h)), Field::Int(v)) => h.estimate_selectivity(op, *v),
            (Some(ColumnHistogram::Text(h)), Field::Text(s)) => h.estimate_selectivity(op, s),
            _ => 0.0,
        }
    }

    /// Mean per-bucket selectivity of the column's histogram, independent of
    /// any operand.
    pub fn avg_selectivity(&self, column: usize) -> f64 {
        match self.histograms.get(&column) {
            Some(ColumnHistogram::Int(h)) => h.avg_selectivity(),
            Some(ColumnHistogram::Text(h)) => h.avg_selectivity(),
            None => 0.0,
        }
    }
}
