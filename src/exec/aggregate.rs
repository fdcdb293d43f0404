//! Hash Aggregate
//!
//! Fully blocking: the child drains on the first pull, one accumulator per
//! group, a single output batch. With no group keys and zero input rows the
//! operator still emits exactly one row - the implicit-grouping aggregates
//! over an empty input (count=0, sum=0, avg/min/max=null).

use crate::error::{Error, Result};
use crate::exec::batch::{Batch, RowBatch};
use crate::exec::Operator;
use crate::value::Value;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    Count,
    CountDistinct,
    Sum,
    Avg,
    Min,
    Max,
}

/// One aggregate to compute.
#[derive(Debug, Clone)]
pub struct AggregateSpec {
    pub func: AggregateFn,
    /// `None` is `*`: count unconditionally
    pub column: Option<String>,
    pub alias: String,
}

impl AggregateSpec {
    pub fn new(func: AggregateFn, column: Option<&str>, alias: &str) -> Self {
        AggregateSpec { func, column: column.map(str::to_string), alias: alias.to_string() }
    }
}

#[derive(Debug, Clone, Copy)]
enum SumState {
    Empty,
    Int(i64),
    Float(f64),
}

impl SumState {
    fn add(&mut self, value: &Value) {
        match (value, *self) {
            (Value::Int(v), SumState::Empty) => *self = SumState::Int(*v),
            (Value::Int(v), SumState::Int(acc)) => *self = SumState::Int(acc + v),
            (Value::Int(v), SumState::Float(acc)) => *self = SumState::Float(acc + *v as f64),
            (Value::Float(v), SumState::Empty) => *self = SumState::Float(*v),
            (Value::Float(v), SumState::Int(acc)) => *self = SumState::Float(acc as f64 + v),
            (Value::Float(v), SumState::Float(acc)) => *self = SumState::Float(acc + v),
            _ => {}
        }
    }

    /// Sum over an empty input is integer zero.
    fn finish(self) -> Value {
        match self {
            SumState::Empty => Value::Int(0),
            SumState::Int(v) => Value::Int(v),
            SumState::Float(v) => Value::Float(v),
        }
    }

    fn as_f64(self) -> Option<f64> {
        match self {
            SumState::Empty => None,
            SumState::Int(v) => Some(v as f64),
            SumState::Float(v) => Some(v),
        }
    }
}

struct Accumulator {
    count: u64,
    distinct: HashSet<Value>,
    sum: SumState,
    min: Option<Value>,
    max: Option<Value>,
}

impl Accumulator {
    fn new() -> Self {
        Accumulator {
            count: 0,
            distinct: HashSet::new(),
            sum: SumState::Empty,
            min: None,
            max: None,
        }
    }

    fn update(&mut self, func: AggregateFn, value: Option<&Value>) {
        match func {
            AggregateFn::Count => {
                // `*` counts unconditionally; a column counts non-null.
                match value {
                    None => self.count += 1,
                    Some(v) if !v.is_null() => self.count += 1,
                    Some(_) => {}
                }
            }
            AggregateFn::CountDistinct => {
                if let Some(v) = value {
                    if !v.is_null() {
                        self.distinct.insert(v.clone());
                    }
                }
            }
            AggregateFn::Sum => {
                if let Some(v) = value {
                    self.sum.add(v);
                }
            }
            AggregateFn::Avg => {
                if let Some(v) = value {
                    if !v.is_null() {
                        self.sum.add(v);
                        self.count += 1;
                    }
                }
            }
            AggregateFn::Min => {
                if let Some(v) = value {
                    if !v.is_null() {
                        let replace = match &self.min {
                            None => true,
                            Some(current) => {
                                v.compare(current) == Some(std::cmp::Ordering::Less)
                            }
                        };
                        if replace {
                            self.min = Some(v.clone());
                        }
                    }
                }
            }
            AggregateFn::Max => {
                if let Some(v) = value {
                    if !v.is_null() {
                        let replace = match &self.max {
                            None => true,
                            Some(current) => {
                                v.compare(current) == Some(std::cmp::Ordering::Greater)
                            }
                        };
                        if replace {
                            self.max = Some(v.clone());
                        }
                    }
                }
            }
        }
    }

    fn finish(self, func: AggregateFn) -> Value {
        match func {
            AggregateFn::Count => Value::Int(self.count as i64),
            AggregateFn::CountDistinct => Value::Int(self.distinct.len() as i64),
            AggregateFn::Sum => self.sum.finish(),
            AggregateFn::Avg => match self.sum.as_f64() {
                Some(sum) if self.count > 0 => Value::Float(sum / self.count as f64),
                _ => Value::Null,
            },
            AggregateFn::Min => self.min.unwrap_or(Value::Null),
            AggregateFn::Max => self.max.unwrap_or(Value::Null),
        }
    }
}

pub struct HashAggregateOp {
    child: Box<dyn Operator>,
    group_keys: Vec<String>,
    aggregates: Vec<AggregateSpec>,
    opened: bool,
    done: bool,
}

impl HashAggregateOp {
    pub fn new(
        child: Box<dyn Operator>,
        group_keys: Vec<String>,
        aggregates: Vec<AggregateSpec>,
    ) -> Self {
        HashAggregateOp { child, group_keys, aggregates, opened: false, done: false }
    }

    fn run(&mut self) -> Result<RowBatch> {
        // One accumulator per aggregate per group, keyed by the group key
        // values. Insertion order is kept for deterministic output.
        let mut groups: HashMap<Vec<Value>, Vec<Accumulator>> = HashMap::new();
        let mut group_order: Vec<Vec<Value>> = Vec::new();

        while let Some(batch) = self.child.next_batch()? {
            let rows = batch.into_rows()?;
            let key_indices: Vec<usize> = self
                .group_keys
                .iter()
                .map(|k| {
                    rows.column_index(k).ok_or_else(|| {
                        Error::io(format!("group key column '{k}' missing from input"))
                    })
                })
                .collect::<Result<_>>()?;
            let agg_indices: Vec<Option<usize>> = self
                .aggregates
                .iter()
                .map(|spec| spec.column.as_deref().and_then(|c| rows.column_index(c)))
                .collect();

            for row in &rows.rows {
                let key: Vec<Value> =
                    key_indices.iter().map(|&i| row[i].clone()).collect();
                let accumulators = groups.entry(key.clone()).or_insert_with(|| {
                    group_order.push(key);
                    (0..self.aggregates.len()).map(|_| Accumulator::new()).collect()
                });
                for (spec, (acc, idx)) in self
                    .aggregates
                    .iter()
                    .zip(accumulators.iter_mut().zip(agg_indices.iter()))
                {
                    let value = idx.map(|i| &row[i]);
                    acc.update(spec.func, value);
                }
            }
        }

        // Implicit grouping: no keys and no input still yields one group.
        if self.group_keys.is_empty() && groups.is_empty() {
            group_order.push(Vec::new());
            groups.insert(
                Vec::new(),
                (0..self.aggregates.len()).map(|_| Accumulator::new()).collect(),
            );
        }

        let mut columns = self.group_keys.clone();
        columns.extend(self.aggregates.iter().map(|spec| spec.alias.clone()));

        let mut out_rows = Vec::with_capacity(group_order.len());
        for key in group_order {
            let accumulators = groups
                .remove(&key)
                .ok_or_else(|| Error::io("aggregate group vanished during finalization"))?;
            let mut row = key;
            for (spec, acc) in self.aggregates.iter().zip(accumulators) {
                row.push(acc.finish(spec.func));
            }
            out_rows.push(row);
        }

        Ok(RowBatch::new(columns, out_rows))
    }
}

impl Operator for HashAggregateOp {
    fn open(&mut self) -> Result<()> {
        if self.opened {
            return Ok(());
        }
        self.child.open()?;
        self.opened = true;
        self.done = false;
        Ok(())
    }

    fn next_batch(&mut self) -> Result<Option<Batch>> {
        if self.done {
            return Ok(None);
        }
        let out = self.run()?;
        self.done = true;
        Ok(Some(Batch::Rows(out)))
    }

    fn close(&mut self) {
        self.child.close();
        self.opened = false;
        self.done = true;
    }

    fn estimated_rows(&self) -> usize {
        if self.group_keys.is_empty() {
            1
        } else {
            // Guess: grouping reduces by an order of magnitude.
            (self.child.estimated_rows() / 10).max(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::collect_rows;
    use crate::exec::scan::ScanOp;
    use crate::exec::source::{MemoryTable, MemoryTableSource, ScanOptions};
    use crate::value::ColumnType;
    use std::sync::Arc;

    fn sales_source(rows: Vec<Vec<Value>>) -> Arc<MemoryTableSource> {
        let mut source = MemoryTableSource::new();
        source.add_table(
            "sales",
            MemoryTable::new(
                vec![("cat", ColumnType::String), ("amt", ColumnType::Int)],
                rows,
            ),
        );
        Arc::new(source)
    }

    fn scan(source: &Arc<MemoryTableSource>) -> Box<dyn Operator> {
        Box::new(ScanOp::new(source.clone(), "sales", None, Vec::new(), ScanOptions::default()))
    }

    #[test]
    fn test_group_by_sum() {
        let source = sales_source(vec![
            vec![Value::from("x"), Value::Int(1)],
            vec![Value::from("x"), Value::Int(2)],
            vec![Value::from("y"), Value::Int(10)],
        ]);
        let mut agg = HashAggregateOp::new(
            scan(&source),
            vec!["cat".to_string()],
            vec![AggregateSpec::new(AggregateFn::Sum, Some("amt"), "s")],
        );
        let mut rows = collect_rows(&mut agg).unwrap();
        rows.sort_by_key(|r| format!("{:?}", r.get("cat")));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("cat"), Some(&Value::from("x")));
        assert_eq!(rows[0].get("s"), Some(&Value::Int(3)));
        assert_eq!(rows[1].get("cat"), Some(&Value::from("y")));
        assert_eq!(rows[1].get("s"), Some(&Value::Int(10)));
    }

    #[test]
    fn test_empty_input_implicit_group_emits_one_row() {
        let source = sales_source(Vec::new());
        let mut agg = HashAggregateOp::new(
            scan(&source),
            Vec::new(),
            vec![
                AggregateSpec::new(AggregateFn::Count, None, "n"),
                AggregateSpec::new(AggregateFn::Sum, Some("amt"), "total"),
                AggregateSpec::new(AggregateFn::Avg, Some("amt"), "mean"),
                AggregateSpec::new(AggregateFn::Min, Some("amt"), "lo"),
                AggregateSpec::new(AggregateFn::Max, Some("amt"), "hi"),
            ],
        );
        let rows = collect_rows(&mut agg).unwrap();
        assert_eq!(rows.len(), 1, "empty input must still emit one row");
        assert_eq!(rows[0].get("n"), Some(&Value::Int(0)));
        assert_eq!(rows[0].get("total"), Some(&Value::Int(0)));
        assert_eq!(rows[0].get("mean"), Some(&Value::Null));
        assert_eq!(rows[0].get("lo"), Some(&Value::Null));
        assert_eq!(rows[0].get("hi"), Some(&Value::Null));
    }

    #[test]
    fn test_empty_input_with_group_keys_emits_nothing() {
        let source = sales_source(Vec::new());
        let mut agg = HashAggregateOp::new(
            scan(&source),
            vec!["cat".to_string()],
            vec![AggregateSpec::new(AggregateFn::Count, None, "n")],
        );
        let rows = collect_rows(&mut agg).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_count_star_vs_count_column_and_distinct() {
        let source = sales_source(vec![
            vec![Value::from("x"), Value::Int(1)],
            vec![Value::from("x"), Value::Null],
            vec![Value::from("x"), Value::Int(1)],
        ]);
        let mut agg = HashAggregateOp::new(
            scan(&source),
            Vec::new(),
            vec![
                AggregateSpec::new(AggregateFn::Count, None, "all"),
                AggregateSpec::new(AggregateFn::Count, Some("amt"), "non_null"),
                AggregateSpec::new(AggregateFn::CountDistinct, Some("amt"), "distinct"),
            ],
        );
        let rows = collect_rows(&mut agg).unwrap();
        assert_eq!(rows[0].get("all"), Some(&Value::Int(3)));
        assert_eq!(rows[0].get("non_null"), Some(&Value::Int(2)));
        assert_eq!(rows[0].get("distinct"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_avg_min_max() {
        let source = sales_source(vec![
            vec![Value::from("x"), Value::Int(2)],
            vec![Value::from("x"), Value::Int(4)],
        ]);
        let mut agg = HashAggregateOp::new(
            scan(&source),
            Vec::new(),
            vec![
                AggregateSpec::new(AggregateFn::Avg, Some("amt"), "mean"),
                AggregateSpec::new(AggregateFn::Min, Some("amt"), "lo"),
                AggregateSpec::new(AggregateFn::Max, Some("amt"), "hi"),
            ],
        );
        let rows = collect_rows(&mut agg).unwrap();
        assert_eq!(rows[0].get("mean"), Some(&Value::Float(3.0)));
        assert_eq!(rows[0].get("lo"), Some(&Value::Int(2)));
        assert_eq!(rows[0].get("hi"), Some(&Value::Int(4)));
    }

    #[test]
    fn test_min_max_strings_lexicographic() {
        let source = sales_source(vec![
            vec![Value::from("pear"), Value::Int(1)],
            vec![Value::from("apple"), Value::Int(1)],
        ]);
        let mut agg = HashAggregateOp::new(
            scan(&source),
            Vec::new(),
            vec![
                AggregateSpec::new(AggregateFn::Min, Some("cat"), "first"),
                AggregateSpec::new(AggregateFn::Max, Some("cat"), "last"),
            ],
        );
        let rows = collect_rows(&mut agg).unwrap();
        assert_eq!(rows[0].get("first"), Some(&Value::from("apple")));
        assert_eq!(rows[0].get("last"), Some(&Value::from("pear")));
    }
}
