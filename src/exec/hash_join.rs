//! Hash Join
//!
//! Two children: build and probe. The build side is consumed in full when
//! the operator opens; probe batches then stream through the hash table.
//!
//! Two modes:
//! - **Row-map**: the build table stores projected rows; each probe row
//!   emits merged build+probe rows.
//! - **Vectorized**: the build table stores `(batch, row)` references and
//!   retains the build batches. Each probe batch runs a two-pass match that
//!   fills three parallel index arrays (`build_batch_idx`, `build_row_idx`,
//!   `probe_row_idx`) sized to the match count, then gathers output columns
//!   from the source vectors into fresh output vectors. `build_batch_idx ==
//!   -1` marks an unmatched probe row under left-outer and writes nulls
//!   into every build-side column.
//!
//! A null in any key column forces no-match (null never equals null). For
//! inner joins the fact side probes and the dimension side builds; for
//! left-outer (OPTIONAL) the required side is ALWAYS probe so required rows
//! cannot be dropped.
//!
//! When build and probe share a column name both land in the output; the
//! operator warns once per join and recommends `output_columns`.

use crate::error::{Error, Result};
use crate::exec::batch::{
    column_type_of, record_batch_from_values, value_at, Batch, ColumnarBatch, RowBatch,
};
use crate::exec::Operator;
use crate::value::{ColumnType, Value};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    LeftOuter,
}

/// Sentinel in `build_batch_idx` for probe rows with no build match.
const NO_MATCH: i32 = -1;

pub struct HashJoinOp {
    build: Box<dyn Operator>,
    probe: Box<dyn Operator>,
    join_type: JoinType,
    build_keys: Vec<String>,
    probe_keys: Vec<String>,
    /// Columns to carry into the output; `None` keeps everything
    output_columns: Option<HashSet<String>>,
    vectorized: bool,
    state: Option<JoinState>,
    collision_warned: bool,
}

enum JoinState {
    RowMap(RowMapState),
    Vectorized(VectorizedState),
}

struct RowMapState {
    /// key -> projected build rows
    table: HashMap<Vec<Value>, Vec<Vec<Value>>>,
    /// projected build column names (output order)
    build_columns: Vec<String>,
}

struct VectorizedState {
    /// key -> (batch index, row index) references
    table: HashMap<Vec<Value>, Vec<(u32, u32)>>,
    /// retained build batches, gathered from at probe time
    batches: Vec<RecordBatch>,
    /// projected (column index, name, type) of the build output
    projected: Vec<(usize, String, DataType)>,
}

impl HashJoinOp {
    pub fn new(
        build: Box<dyn Operator>,
        probe: Box<dyn Operator>,
        join_type: JoinType,
        build_keys: Vec<String>,
        probe_keys: Vec<String>,
    ) -> Self {
        HashJoinOp {
            build,
            probe,
            join_type,
            build_keys,
            probe_keys,
            output_columns: None,
            vectorized: false,
            state: None,
            collision_warned: false,
        }
    }

    /// Trim which columns are copied from build and probe into the output.
    /// The plan compiler keeps downstream join keys in this set.
    pub fn with_output_columns(mut self, columns: HashSet<String>) -> Self {
        self.output_columns = Some(columns);
        self
    }

    pub fn vectorized(mut self, vectorized: bool) -> Self {
        self.vectorized = vectorized;
        self
    }

    fn keep_column(&self, name: &str) -> bool {
        match &self.output_columns {
            Some(set) => set.contains(name),
            None => true,
        }
    }

    fn warn_on_collision(&mut self, build_columns: &[String], probe_columns: &[String]) {
        if self.collision_warned {
            return;
        }
        let shared: Vec<&String> =
            build_columns.iter().filter(|c| probe_columns.contains(c)).collect();
        if !shared.is_empty() {
            tracing::warn!(
                columns = ?shared,
                "build and probe sides share column names; both land in the output - \
                 consider setting output_columns"
            );
            self.collision_warned = true;
        }
    }

    // ------------------------------------------------------------------
    // Build phase
    // ------------------------------------------------------------------

    fn build_row_map(&mut self) -> Result<RowMapState> {
        let mut table: HashMap<Vec<Value>, Vec<Vec<Value>>> = HashMap::new();
        let mut build_columns: Option<Vec<String>> = None;
        let mut projected_indices: Vec<usize> = Vec::new();

        while let Some(batch) = self.build.next_batch()? {
            let rows = batch.into_rows()?;
            if build_columns.is_none() {
                projected_indices = (0..rows.columns.len())
                    .filter(|&i| self.keep_column(&rows.columns[i]))
                    .collect();
                build_columns =
                    Some(projected_indices.iter().map(|&i| rows.columns[i].clone()).collect());
            }
            let key_indices = key_indices(&rows.columns, &self.build_keys)?;
            for row in &rows.rows {
                let Some(key) = extract_key(row, &key_indices) else {
                    continue;
                };
                let projected: Vec<Value> =
                    projected_indices.iter().map(|&i| row[i].clone()).collect();
                table.entry(key).or_default().push(projected);
            }
        }

        Ok(RowMapState { table, build_columns: build_columns.unwrap_or_default() })
    }

    fn build_vectorized(&mut self) -> Result<VectorizedState> {
        let mut table: HashMap<Vec<Value>, Vec<(u32, u32)>> = HashMap::new();
        let mut batches: Vec<RecordBatch> = Vec::new();
        let mut projected: Vec<(usize, String, DataType)> = Vec::new();

        while let Some(batch) = self.build.next_batch()? {
            let record = match batch {
                Batch::Columnar(c) => c.batch,
                Batch::Rows(r) => r.to_record_batch()?,
            };
            if batches.is_empty() {
                projected = record
                    .schema()
                    .fields()
                    .iter()
                    .enumerate()
                    .filter(|(_, f)| self.keep_column(f.name()))
                    .map(|(i, f)| (i, f.name().clone(), f.data_type().clone()))
                    .collect();
            }
            let schema = record.schema();
            let key_cols: Vec<usize> = self
                .build_keys
                .iter()
                .map(|k| {
                    schema.index_of(k).map_err(|_| {
                        Error::io(format!("build side is missing join key column '{k}'"))
                    })
                })
                .collect::<Result<_>>()?;

            let batch_idx = batches.len() as u32;
            for row in 0..record.num_rows() {
                let mut key = Vec::with_capacity(key_cols.len());
                let mut null_key = false;
                for &col in &key_cols {
                    let value = value_at(&record, col, row)?;
                    if value.is_null() {
                        null_key = true;
                        break;
                    }
                    key.push(value);
                }
                if null_key {
                    continue;
                }
                table.entry(key).or_default().push((batch_idx, row as u32));
            }
            batches.push(record);
        }

        Ok(VectorizedState { table, batches, projected })
    }

    // ------------------------------------------------------------------
    // Probe phase
    // ------------------------------------------------------------------

    fn probe_row_map(&mut self, state: &RowMapState, probe: RowBatch) -> Result<RowBatch> {
        let probe_projected: Vec<usize> = (0..probe.columns.len())
            .filter(|&i| self.keep_column(&probe.columns[i]))
            .collect();
        let probe_columns: Vec<String> =
            probe_projected.iter().map(|&i| probe.columns[i].clone()).collect();
        self.warn_on_collision(&state.build_columns, &probe_columns);

        let mut out_columns = state.build_columns.clone();
        out_columns.extend(probe_columns);

        let key_indices = key_indices(&probe.columns, &self.probe_keys)?;
        let build_width = state.build_columns.len();
        let mut out_rows = Vec::new();

        for row in &probe.rows {
            let key = extract_key(row, &key_indices);
            let matches = key.as_ref().and_then(|k| state.table.get(k));
            let probe_values: Vec<Value> =
                probe_projected.iter().map(|&i| row[i].clone()).collect();
            match matches {
                Some(build_rows) => {
                    for build_row in build_rows {
                        let mut merged = Vec::with_capacity(build_width + probe_values.len());
                        merged.extend(build_row.iter().cloned());
                        merged.extend(probe_values.iter().cloned());
                        out_rows.push(merged);
                    }
                }
                None => {
                    if self.join_type == JoinType::LeftOuter {
                        let mut merged = Vec::with_capacity(build_width + probe_values.len());
                        merged.extend(std::iter::repeat(Value::Null).take(build_width));
                        merged.extend(probe_values.iter().cloned());
                        out_rows.push(merged);
                    }
                }
            }
        }

        Ok(RowBatch::new(out_columns, out_rows))
    }

    fn probe_vectorized(
        &mut self,
        state: &VectorizedState,
        probe: RecordBatch,
    ) -> Result<ColumnarBatch> {
        let schema = probe.schema();
        let key_cols: Vec<usize> = self
            .probe_keys
            .iter()
            .map(|k| {
                schema.index_of(k).map_err(|_| {
                    Error::io(format!("probe side is missing join key column '{k}'"))
                })
            })
            .collect::<Result<_>>()?;
        let probe_projected: Vec<(usize, String, DataType)> = schema
            .fields()
            .iter()
            .enumerate()
            .filter(|(_, f)| self.keep_column(f.name()))
            .map(|(i, f)| (i, f.name().clone(), f.data_type().clone()))
            .collect();
        {
            let build_names: Vec<String> =
                state.projected.iter().map(|(_, n, _)| n.clone()).collect();
            let probe_names: Vec<String> =
                probe_projected.iter().map(|(_, n, _)| n.clone()).collect();
            self.warn_on_collision(&build_names, &probe_names);
        }

        // Pass 1: size the index arrays.
        let mut probe_keys_cache: Vec<Option<Vec<Value>>> = Vec::with_capacity(probe.num_rows());
        let mut match_count = 0usize;
        for row in 0..probe.num_rows() {
            let mut key = Vec::with_capacity(key_cols.len());
            let mut null_key = false;
            for &col in &key_cols {
                let value = value_at(&probe, col, row)?;
                if value.is_null() {
                    null_key = true;
                    break;
                }
                key.push(value);
            }
            let key = if null_key { None } else { Some(key) };
            match_count += match key.as_ref().and_then(|k| state.table.get(k)) {
                Some(refs) => refs.len(),
                None => usize::from(self.join_type == JoinType::LeftOuter),
            };
            probe_keys_cache.push(key);
        }

        // Pass 2: fill the three parallel index arrays.
        let mut build_batch_idx: Vec<i32> = Vec::with_capacity(match_count);
        let mut build_row_idx: Vec<i32> = Vec::with_capacity(match_count);
        let mut probe_row_idx: Vec<i32> = Vec::with_capacity(match_count);
        for (row, key) in probe_keys_cache.iter().enumerate() {
            match key.as_ref().and_then(|k| state.table.get(k)) {
                Some(refs) => {
                    for &(bi, ri) in refs {
                        build_batch_idx.push(bi as i32);
                        build_row_idx.push(ri as i32);
                        probe_row_idx.push(row as i32);
                    }
                }
                None => {
                    if self.join_type == JoinType::LeftOuter {
                        build_batch_idx.push(NO_MATCH);
                        build_row_idx.push(NO_MATCH);
                        probe_row_idx.push(row as i32);
                    }
                }
            }
        }

        // Gather output columns straight from the source vectors into fresh
        // output vectors; no per-row map materialization.
        let mut fields: Vec<(String, ColumnType)> = Vec::new();
        let mut out_columns: Vec<Vec<Value>> = Vec::new();

        for (col, name, dt) in &state.projected {
            let column_type = column_type_of(dt)
                .ok_or_else(|| Error::unsupported(format!("unsupported join column type {dt}")))?;
            let mut gathered = Vec::with_capacity(match_count);
            for (&bi, &ri) in build_batch_idx.iter().zip(build_row_idx.iter()) {
                if bi == NO_MATCH {
                    gathered.push(Value::Null);
                } else {
                    gathered.push(value_at(&state.batches[bi as usize], *col, ri as usize)?);
                }
            }
            fields.push((name.clone(), column_type));
            out_columns.push(gathered);
        }
        for (col, name, dt) in &probe_projected {
            let column_type = column_type_of(dt)
                .ok_or_else(|| Error::unsupported(format!("unsupported join column type {dt}")))?;
            let mut gathered = Vec::with_capacity(match_count);
            for &pi in &probe_row_idx {
                gathered.push(value_at(&probe, *col, pi as usize)?);
            }
            fields.push((name.clone(), column_type));
            out_columns.push(gathered);
        }

        let out = record_batch_from_values(&fields, out_columns)?;
        Ok(ColumnarBatch::owned(out))
    }
}

fn key_indices(columns: &[String], keys: &[String]) -> Result<Vec<usize>> {
    keys.iter()
        .map(|k| {
            columns
                .iter()
                .position(|c| c == k)
                .ok_or_else(|| Error::io(format!("missing join key column '{k}'")))
        })
        .collect()
}

/// `None` when any key column is null: null never joins.
fn extract_key(row: &[Value], key_indices: &[usize]) -> Option<Vec<Value>> {
    let mut key = Vec::with_capacity(key_indices.len());
    for &idx in key_indices {
        let value = &row[idx];
        if value.is_null() {
            return None;
        }
        key.push(value.clone());
    }
    Some(key)
}

impl Operator for HashJoinOp {
    /// Opens children and drains the build side into the hash table.
    fn open(&mut self) -> Result<()> {
        if self.state.is_some() {
            return Ok(());
        }
        self.build.open()?;
        self.probe.open()?;
        let state = if self.vectorized {
            JoinState::Vectorized(self.build_vectorized()?)
        } else {
            JoinState::RowMap(self.build_row_map()?)
        };
        self.state = Some(state);
        Ok(())
    }

    fn next_batch(&mut self) -> Result<Option<Batch>> {
        loop {
            let Some(probe_batch) = self.probe.next_batch()? else {
                return Ok(None);
            };
            let state = self
                .state
                .take()
                .ok_or_else(|| Error::io("hash join polled before open"))?;
            let out = match &state {
                JoinState::RowMap(row_state) => {
                    let rows = probe_batch.into_rows()?;
                    let joined = self.probe_row_map(row_state, rows)?;
                    Batch::Rows(joined)
                }
                JoinState::Vectorized(vec_state) => {
                    let record = match probe_batch {
                        Batch::Columnar(c) => c.batch,
                        Batch::Rows(r) => r.to_record_batch()?,
                    };
                    let joined = self.probe_vectorized(vec_state, record)?;
                    Batch::Columnar(joined)
                }
            };
            self.state = Some(state);
            if out.num_rows() > 0 {
                return Ok(Some(out));
            }
            // Empty result for this probe batch; pull the next one.
        }
    }

    /// Clears the hash table and closes children.
    fn close(&mut self) {
        self.state = None;
        self.build.close();
        self.probe.close();
    }

    fn estimated_rows(&self) -> usize {
        self.build.estimated_rows().max(self.probe.estimated_rows())
    }
}
