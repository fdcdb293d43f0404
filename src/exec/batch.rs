//! Batch Representations
//!
//! A batch is either row-oriented (shared column list plus value rows) or
//! columnar (an Arrow record batch with an explicit ownership marker). Row
//! maps are materialized only at the boundary.

use crate::error::{Error, Result};
use crate::value::{ColumnType, Value};
use arrow::array::{
    Array, ArrayRef, BooleanArray, Date32Array, Float64Array, Int64Array, StringArray,
    TimestampMicrosecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use std::collections::HashMap;
use std::sync::Arc;

/// Row-oriented batch: one shared column list, one `Vec<Value>` per row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowBatch {
    pub columns: Arc<Vec<String>>,
    pub rows: Vec<Vec<Value>>,
}

impl RowBatch {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        RowBatch { columns: Arc::new(columns), rows }
    }

    pub fn empty(columns: Vec<String>) -> Self {
        RowBatch::new(columns, Vec::new())
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Index of the first column with this name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn value(&self, row: usize, column: usize) -> &Value {
        &self.rows[row][column]
    }

    /// Materialize row maps; the boundary representation for callers.
    pub fn to_row_maps(&self) -> Vec<HashMap<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect::<HashMap<String, Value>>()
            })
            .collect()
    }

    /// Convert into an Arrow record batch. Column types are inferred from
    /// the first non-null value; all-null columns land as Utf8.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let mut fields = Vec::with_capacity(self.columns.len());
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(self.columns.len());

        for (idx, name) in self.columns.iter().enumerate() {
            let column_type = self
                .rows
                .iter()
                .find_map(|row| row[idx].column_type())
                .unwrap_or(ColumnType::String);
            let (data_type, array) = build_array(column_type, self.rows.iter().map(|r| &r[idx]))?;
            fields.push(Field::new(name, data_type, true));
            arrays.push(array);
        }

        let schema = Arc::new(Schema::new(fields));
        Ok(RecordBatch::try_new(schema, arrays)?)
    }
}

fn build_array<'a>(
    column_type: ColumnType,
    values: impl Iterator<Item = &'a Value>,
) -> Result<(DataType, ArrayRef)> {
    match column_type {
        ColumnType::Int => {
            let data: Vec<Option<i64>> = values
                .map(|v| match v {
                    Value::Int(i) => Some(*i),
                    _ => None,
                })
                .collect();
            Ok((DataType::Int64, Arc::new(Int64Array::from(data))))
        }
        ColumnType::Float => {
            let data: Vec<Option<f64>> = values
                .map(|v| match v {
                    Value::Float(f) => Some(*f),
                    Value::Int(i) => Some(*i as f64),
                    _ => None,
                })
                .collect();
            Ok((DataType::Float64, Arc::new(Float64Array::from(data))))
        }
        ColumnType::Bool => {
            let data: Vec<Option<bool>> = values
                .map(|v| match v {
                    Value::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect();
            Ok((DataType::Boolean, Arc::new(BooleanArray::from(data))))
        }
        ColumnType::String => {
            let data: Vec<Option<String>> = values
                .map(|v| match v {
                    Value::Str(s) => Some(s.clone()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .collect();
            Ok((DataType::Utf8, Arc::new(StringArray::from(data))))
        }
        ColumnType::Timestamp => {
            let data: Vec<Option<i64>> = values
                .map(|v| match v {
                    Value::Timestamp(us) => Some(*us),
                    _ => None,
                })
                .collect();
            Ok((
                DataType::Timestamp(TimeUnit::Microsecond, None),
                Arc::new(TimestampMicrosecondArray::from(data)),
            ))
        }
        ColumnType::Date => {
            let data: Vec<Option<i32>> = values
                .map(|v| match v {
                    Value::Date(d) => Some(*d),
                    _ => None,
                })
                .collect();
            Ok((DataType::Date32, Arc::new(Date32Array::from(data))))
        }
    }
}

/// Map an Arrow type to the native column type, where one exists.
pub fn column_type_of(data_type: &DataType) -> Option<ColumnType> {
    match data_type {
        DataType::Int64 => Some(ColumnType::Int),
        DataType::Float64 => Some(ColumnType::Float),
        DataType::Boolean => Some(ColumnType::Bool),
        DataType::Utf8 => Some(ColumnType::String),
        DataType::Timestamp(TimeUnit::Microsecond, _) => Some(ColumnType::Timestamp),
        DataType::Date32 => Some(ColumnType::Date),
        _ => None,
    }
}

/// Assemble a record batch from per-column values with declared types, so
/// the output schema stays stable even when a column is entirely null.
pub fn record_batch_from_values(
    fields: &[(String, ColumnType)],
    columns: Vec<Vec<Value>>,
) -> Result<RecordBatch> {
    debug_assert_eq!(fields.len(), columns.len());
    let mut schema_fields = Vec::with_capacity(fields.len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(fields.len());
    for ((name, column_type), values) in fields.iter().zip(columns) {
        let (data_type, array) = build_array(*column_type, values.iter())?;
        schema_fields.push(Field::new(name, data_type, true));
        arrays.push(array);
    }
    let schema = Arc::new(Schema::new(schema_fields));
    if arrays.is_empty() {
        return Ok(RecordBatch::new_empty(schema));
    }
    Ok(RecordBatch::try_new(schema, arrays)?)
}

/// Columnar batch with an explicit ownership marker. `owned == false`
/// means the vectors are shared with the producing iterator and the batch
/// is valid only until the next pull.
#[derive(Debug, Clone)]
pub struct ColumnarBatch {
    pub batch: RecordBatch,
    pub owned: bool,
}

impl ColumnarBatch {
    pub fn owned(batch: RecordBatch) -> Self {
        ColumnarBatch { batch, owned: true }
    }

    pub fn shared(batch: RecordBatch) -> Self {
        ColumnarBatch { batch, owned: false }
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    /// Convert to the row representation.
    pub fn to_row_batch(&self) -> Result<RowBatch> {
        let schema = self.batch.schema();
        let columns: Vec<String> =
            schema.fields().iter().map(|f| f.name().clone()).collect();
        let mut rows = Vec::with_capacity(self.batch.num_rows());
        for row in 0..self.batch.num_rows() {
            let mut values = Vec::with_capacity(columns.len());
            for col in 0..columns.len() {
                values.push(value_at(&self.batch, col, row)?);
            }
            rows.push(values);
        }
        Ok(RowBatch::new(columns, rows))
    }
}

/// Extract one cell from a record batch as a [`Value`].
pub fn value_at(batch: &RecordBatch, column: usize, row: usize) -> Result<Value> {
    let array = batch.column(column);
    if array.is_null(row) {
        return Ok(Value::Null);
    }
    match array.data_type() {
        DataType::Int64 => {
            let typed = array
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(|| Error::io("Int64 column downcast failed"))?;
            Ok(Value::Int(typed.value(row)))
        }
        DataType::Float64 => {
            let typed = array
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(|| Error::io("Float64 column downcast failed"))?;
            Ok(Value::Float(typed.value(row)))
        }
        DataType::Boolean => {
            let typed = array
                .as_any()
                .downcast_ref::<BooleanArray>()
                .ok_or_else(|| Error::io("Boolean column downcast failed"))?;
            Ok(Value::Bool(typed.value(row)))
        }
        DataType::Utf8 => {
            let typed = array
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| Error::io("Utf8 column downcast failed"))?;
            Ok(Value::Str(typed.value(row).to_string()))
        }
        DataType::Timestamp(TimeUnit::Microsecond, _) => {
            let typed = array
                .as_any()
                .downcast_ref::<TimestampMicrosecondArray>()
                .ok_or_else(|| Error::io("Timestamp column downcast failed"))?;
            Ok(Value::Timestamp(typed.value(row)))
        }
        DataType::Date32 => {
            let typed = array
                .as_any()
                .downcast_ref::<Date32Array>()
                .ok_or_else(|| Error::io("Date32 column downcast failed"))?;
            Ok(Value::Date(typed.value(row)))
        }
        other => Err(Error::unsupported(format!("unsupported Arrow column type {other}"))),
    }
}

/// A batch flowing between operators.
#[derive(Debug, Clone)]
pub enum Batch {
    Rows(RowBatch),
    Columnar(ColumnarBatch),
}

impl Batch {
    pub fn num_rows(&self) -> usize {
        match self {
            Batch::Rows(b) => b.num_rows(),
            Batch::Columnar(b) => b.num_rows(),
        }
    }

    /// Row representation, converting when columnar.
    pub fn into_rows(self) -> Result<RowBatch> {
        match self {
            Batch::Rows(b) => Ok(b),
            Batch::Columnar(b) => b.to_row_batch(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RowBatch {
        RowBatch::new(
            vec!["id".to_string(), "name".to_string(), "score".to_string()],
            vec![
                vec![Value::Int(1), Value::from("a"), Value::Float(1.5)],
                vec![Value::Int(2), Value::Null, Value::Float(2.5)],
            ],
        )
    }

    #[test]
    fn test_row_batch_round_trips_through_arrow() {
        let rows = sample();
        let record = rows.to_record_batch().unwrap();
        assert_eq!(record.num_rows(), 2);
        assert_eq!(record.schema().field(0).data_type(), &DataType::Int64);
        assert_eq!(record.schema().field(1).data_type(), &DataType::Utf8);

        let back = ColumnarBatch::owned(record).to_row_batch().unwrap();
        assert_eq!(back, rows);
    }

    #[test]
    fn test_value_at_handles_nulls() {
        let record = sample().to_record_batch().unwrap();
        assert_eq!(value_at(&record, 1, 1).unwrap(), Value::Null);
        assert_eq!(value_at(&record, 1, 0).unwrap(), Value::from("a"));
    }

    #[test]
    fn test_row_maps_at_boundary() {
        let maps = sample().to_row_maps();
        assert_eq!(maps.len(), 2);
        assert_eq!(maps[0].get("id"), Some(&Value::Int(1)));
        assert_eq!(maps[1].get("name"), Some(&Value::Null));
    }

    #[test]
    fn test_all_null_column_defaults_to_utf8() {
        let rows = RowBatch::new(
            vec!["x".to_string()],
            vec![vec![Value::Null], vec![Value::Null]],
        );
        let record = rows.to_record_batch().unwrap();
        assert_eq!(record.schema().field(0).data_type(), &DataType::Utf8);
    }

    #[test]
    fn test_temporal_round_trip() {
        let rows = RowBatch::new(
            vec!["ts".to_string(), "d".to_string()],
            vec![vec![Value::Timestamp(1_700_000_000_000_000), Value::Date(19700)]],
        );
        let record = rows.to_record_batch().unwrap();
        let back = ColumnarBatch::owned(record).to_row_batch().unwrap();
        assert_eq!(back, rows);
    }
}
