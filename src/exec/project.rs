//! Projection
//!
//! Column selection and renaming applied at the boundary when the source
//! could not push the projection down.

use crate::error::{Error, Result};
use crate::exec::batch::{Batch, RowBatch};
use crate::exec::Operator;

pub struct ProjectOp {
    child: Box<dyn Operator>,
    /// (source column, output name)
    columns: Vec<(String, String)>,
    opened: bool,
}

impl ProjectOp {
    pub fn new(child: Box<dyn Operator>, columns: Vec<(String, String)>) -> Self {
        ProjectOp { child, columns, opened: false }
    }

    /// Selection without renaming.
    pub fn select(child: Box<dyn Operator>, columns: Vec<String>) -> Self {
        let columns = columns.into_iter().map(|c| (c.clone(), c)).collect();
        ProjectOp::new(child, columns)
    }

    fn apply(&self, batch: RowBatch) -> Result<RowBatch> {
        let indices: Vec<usize> = self
            .columns
            .iter()
            .map(|(source, _)| {
                batch.column_index(source).ok_or_else(|| {
                    Error::io(format!("projection references unknown column '{source}'"))
                })
            })
            .collect::<Result<_>>()?;
        let out_columns: Vec<String> =
            self.columns.iter().map(|(_, name)| name.clone()).collect();
        let rows = batch
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Ok(RowBatch::new(out_columns, rows))
    }
}

impl Operator for ProjectOp {
    fn open(&mut self) -> Result<()> {
        if self.opened {
            return Ok(());
        }
        self.child.open()?;
        self.opened = true;
        Ok(())
    }

    fn next_batch(&mut self) -> Result<Option<Batch>> {
        match self.child.next_batch()? {
            Some(batch) => Ok(Some(Batch::Rows(self.apply(batch.into_rows()?)?))),
            None => Ok(None),
        }
    }

    fn close(&mut self) {
        self.child.close();
        self.opened = false;
    }

    fn estimated_rows(&self) -> usize {
        self.child.estimated_rows()
    }
}
