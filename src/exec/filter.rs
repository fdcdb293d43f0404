//! Residual Filter
//!
//! Pass-through for predicates the source could not evaluate during scan.
//! The row estimate scales the child's by a selectivity guess.

use crate::error::Result;
use crate::exec::batch::{Batch, RowBatch};
use crate::exec::Operator;
use crate::pushdown::PushdownPredicate;

const DEFAULT_SELECTIVITY: f64 = 0.5;

pub struct FilterOp {
    child: Box<dyn Operator>,
    predicates: Vec<PushdownPredicate>,
    selectivity: f64,
    opened: bool,
}

impl FilterOp {
    pub fn new(child: Box<dyn Operator>, predicates: Vec<PushdownPredicate>) -> Self {
        FilterOp { child, predicates, selectivity: DEFAULT_SELECTIVITY, opened: false }
    }

    pub fn with_selectivity(mut self, selectivity: f64) -> Self {
        self.selectivity = selectivity.clamp(0.0, 1.0);
        self
    }

    fn apply(&self, batch: RowBatch) -> RowBatch {
        let indices: Vec<Option<usize>> = self
            .predicates
            .iter()
            .map(|p| batch.column_index(&p.column))
            .collect();
        let rows = batch
            .rows
            .into_iter()
            .filter(|row| {
                self.predicates.iter().zip(&indices).all(|(pred, idx)| match idx {
                    Some(i) => pred.matches(&row[*i]),
                    // A predicate over an absent column filters nothing.
                    None => true,
                })
            })
            .collect();
        RowBatch { columns: batch.columns, rows }
    }
}

impl Operator for FilterOp {
    fn open(&mut self) -> Result<()> {
        if self.opened {
            return Ok(());
        }
        self.child.open()?;
        self.opened = true;
        Ok(())
    }

    fn next_batch(&mut self) -> Result<Option<Batch>> {
        loop {
            let Some(batch) = self.child.next_batch()? else {
                return Ok(None);
            };
            let filtered = self.apply(batch.into_rows()?);
            if filtered.num_rows() > 0 {
                return Ok(Some(Batch::Rows(filtered)));
            }
        }
    }

    fn close(&mut self) {
        self.child.close();
        self.opened = false;
    }

    fn estimated_rows(&self) -> usize {
        ((self.child.estimated_rows() as f64) * self.selectivity).ceil() as usize
    }
}
