//! Scan Operator
//!
//! Produces batches by delegating to a tabular source, in row or columnar
//! mode. Pushdown predicates and the column projection travel with the
//! request; time-travel options are passed verbatim to the source.

use crate::error::Result;
use crate::exec::batch::Batch;
use crate::exec::source::{ScanOptions, ScanRequest, TabularSource};
use crate::exec::Operator;
use crate::pushdown::PushdownPredicate;
use std::sync::Arc;

/// Fallback row estimate when the source reports no statistics.
const DEFAULT_ROW_ESTIMATE: usize = 1000;

pub struct ScanOp {
    source: Arc<dyn TabularSource>,
    request: ScanRequest,
    iter: Option<Box<dyn Iterator<Item = Result<Batch>> + Send>>,
    estimated: usize,
}

impl ScanOp {
    pub fn new(
        source: Arc<dyn TabularSource>,
        table: impl Into<String>,
        columns: Option<Vec<String>>,
        predicates: Vec<PushdownPredicate>,
        options: ScanOptions,
    ) -> Self {
        let table = table.into();
        let estimated = source
            .stats(&table)
            .map(|s| s.row_count)
            .unwrap_or(DEFAULT_ROW_ESTIMATE);
        ScanOp {
            source,
            request: ScanRequest { table, columns, predicates, options },
            iter: None,
            estimated,
        }
    }

    pub fn table(&self) -> &str {
        &self.request.table
    }

    pub fn request(&self) -> &ScanRequest {
        &self.request
    }
}

impl Operator for ScanOp {
    fn open(&mut self) -> Result<()> {
        if self.iter.is_some() {
            return Ok(());
        }
        let iter: Box<dyn Iterator<Item = Result<Batch>> + Send> =
            if self.request.options.use_columnar_batches {
                Box::new(
                    self.source
                        .scan_columnar_batches(&self.request)?
                        .map(|b| b.map(Batch::Columnar)),
                )
            } else {
                Box::new(
                    self.source
                        .scan_row_batches(&self.request)?
                        .map(|b| b.map(Batch::Rows)),
                )
            };
        self.iter = Some(iter);
        Ok(())
    }

    fn next_batch(&mut self) -> Result<Option<Batch>> {
        match &mut self.iter {
            Some(iter) => iter.next().transpose(),
            None => Ok(None),
        }
    }

    fn close(&mut self) {
        self.iter = None;
    }

    fn estimated_rows(&self) -> usize {
        self.estimated
    }

    fn batches_copied(&self) -> bool {
        self.request.options.copy_batches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::source::{MemoryTable, MemoryTableSource};
    use crate::exec::collect_rows;
    use crate::value::{ColumnType, Value};

    fn source() -> Arc<MemoryTableSource> {
        let mut source = MemoryTableSource::new();
        source.add_table(
            "t",
            MemoryTable::new(
                vec![("k", ColumnType::Int), ("v", ColumnType::String)],
                vec![
                    vec![Value::Int(1), Value::from("a")],
                    vec![Value::Int(2), Value::from("b")],
                ],
            ),
        );
        Arc::new(source)
    }

    #[test]
    fn test_scan_rows() {
        let mut scan = ScanOp::new(source(), "t", None, Vec::new(), ScanOptions::default());
        assert_eq!(scan.estimated_rows(), 2);
        assert!(scan.batches_copied());
        let rows = collect_rows(&mut scan).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("v"), Some(&Value::from("a")));
    }

    #[test]
    fn test_scan_columnar_mode() {
        let options = ScanOptions { use_columnar_batches: true, ..ScanOptions::default() };
        let mut scan = ScanOp::new(source(), "t", None, Vec::new(), options);
        scan.open().unwrap();
        let batch = scan.next_batch().unwrap().unwrap();
        assert!(matches!(batch, Batch::Columnar(_)));
        scan.close();
        // close is idempotent and next_batch after close ends the stream
        scan.close();
        assert!(scan.next_batch().unwrap().is_none());
    }

    #[test]
    fn test_open_is_idempotent() {
        let mut scan = ScanOp::new(source(), "t", None, Vec::new(), ScanOptions::default());
        scan.open().unwrap();
        scan.open().unwrap();
        let mut total = 0;
        while let Some(batch) = scan.next_batch().unwrap() {
            total += batch.num_rows();
        }
        assert_eq!(total, 2);
    }
}
