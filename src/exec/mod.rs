//! Tabular Execution
//!
//! A pull-based operator tree over columnar record batches: Scan, HashJoin
//! (row-map and vectorized, inner and left-outer), Filter, Project, Union,
//! HashAggregate.
//!
//! ## Operator contract
//!
//! - `open` initializes state and opens children; idempotent.
//! - `next_batch` returns the next output batch or `None` at end of stream.
//!   Returned batches are owned by the operator unless `batches_copied`
//!   reports false, in which case they share the underlying iterator's
//!   buffers and are valid only until the next pull.
//! - `close` releases held resources and closes children; idempotent and
//!   safe after partial iteration.
//! - `estimated_rows` is a planning-time estimate, never a correctness
//!   contract.
//!
//! Operators are single-threaded per instance: `open`/`next_batch`/`close`
//! are called from one logical thread. Parallelism is realized by running
//! independent pipelines over disjoint sources and merging their outputs.

pub mod aggregate;
pub mod batch;
pub mod filter;
pub mod hash_join;
pub mod project;
pub mod scan;
pub mod source;
pub mod union;

pub use aggregate::{AggregateFn, AggregateSpec, HashAggregateOp};
pub use batch::{Batch, ColumnarBatch, RowBatch};
pub use filter::FilterOp;
pub use hash_join::{HashJoinOp, JoinType};
pub use project::ProjectOp;
pub use scan::ScanOp;
pub use source::{
    MemoryTable, MemoryTableSource, ParquetTableSource, ScanOptions, ScanRequest, TableStats,
    TabularSource, TimeTravel,
};
pub use union::UnionOp;

use crate::error::Result;

/// Default rows per batch when a scan does not configure one.
pub const DEFAULT_BATCH_SIZE: usize = 4096;

/// Pull-based operator.
pub trait Operator: Send {
    /// Initialize state and open children. Idempotent.
    fn open(&mut self) -> Result<()>;

    /// The next output batch, or `None` at end of stream. Callers MUST
    /// consume the returned batch before the next pull.
    fn next_batch(&mut self) -> Result<Option<Batch>>;

    /// Release resources and close children. Idempotent.
    fn close(&mut self);

    /// Planning-time row estimate.
    fn estimated_rows(&self) -> usize;

    /// Whether returned batches own their memory (safe to keep) or share
    /// the underlying iterator's buffers (valid only until the next pull).
    fn batches_copied(&self) -> bool {
        true
    }
}

/// Drain an operator to completion, collecting every row. Test and
/// boundary helper; opens and closes the operator.
pub fn collect_rows(op: &mut dyn Operator) -> Result<Vec<std::collections::HashMap<String, crate::value::Value>>> {
    op.open()?;
    let mut rows = Vec::new();
    while let Some(batch) = op.next_batch()? {
        let row_batch = batch.into_rows()?;
        rows.extend(row_batch.to_row_maps());
    }
    op.close();
    Ok(rows)
}
