//! Union
//!
//! An ordered list of children executed sequentially, never interleaved:
//! child 1 drains to exhaustion, then child 2, and so on. The estimate is
//! the sum of the children's.

use crate::error::Result;
use crate::exec::batch::Batch;
use crate::exec::Operator;

pub struct UnionOp {
    children: Vec<Box<dyn Operator>>,
    current: usize,
    opened: bool,
}

impl UnionOp {
    pub fn new(children: Vec<Box<dyn Operator>>) -> Self {
        UnionOp { children, current: 0, opened: false }
    }
}

impl Operator for UnionOp {
    fn open(&mut self) -> Result<()> {
        if self.opened {
            return Ok(());
        }
        for child in &mut self.children {
            child.open()?;
        }
        self.current = 0;
        self.opened = true;
        Ok(())
    }

    fn next_batch(&mut self) -> Result<Option<Batch>> {
        while self.current < self.children.len() {
            match self.children[self.current].next_batch()? {
                Some(batch) => return Ok(Some(batch)),
                None => self.current += 1,
            }
        }
        Ok(None)
    }

    fn close(&mut self) {
        for child in &mut self.children {
            child.close();
        }
        self.opened = false;
    }

    fn estimated_rows(&self) -> usize {
        self.children.iter().map(|c| c.estimated_rows()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::scan::ScanOp;
    use crate::exec::source::{MemoryTable, MemoryTableSource, ScanOptions};
    use crate::value::{ColumnType, Value};
    use std::sync::Arc;

    #[test]
    fn test_union_drains_children_in_declared_order() {
        let mut source = MemoryTableSource::new();
        source.add_table(
            "first",
            MemoryTable::new(
                vec![("v", ColumnType::Int)],
                vec![vec![Value::Int(1)], vec![Value::Int(2)]],
            ),
        );
        source.add_table(
            "second",
            MemoryTable::new(
                vec![("v", ColumnType::Int)],
                vec![vec![Value::Int(10)], vec![Value::Int(20)]],
            ),
        );
        let source = Arc::new(source);
        let scan = |table: &str| -> Box<dyn Operator> {
            Box::new(ScanOp::new(source.clone(), table, None, Vec::new(), ScanOptions::default()))
        };

        let mut union = UnionOp::new(vec![scan("first"), scan("second")]);
        assert_eq!(union.estimated_rows(), 4);

        union.open().unwrap();
        let mut values = Vec::new();
        while let Some(batch) = union.next_batch().unwrap() {
            let rows = batch.into_rows().unwrap();
            for row in &rows.rows {
                values.push(row[0].clone());
            }
        }
        union.close();
        assert_eq!(
            values,
            vec![Value::Int(1), Value::Int(2), Value::Int(10), Value::Int(20)],
            "child 1's rows must all precede child 2's"
        );
    }
}
