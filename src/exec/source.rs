//! Tabular Sources
//!
//! The external-table seam the Scan operator delegates to. A source serves
//! row-oriented or columnar batches for a table, applies pushdown
//! predicates and column projection file-side, and reports statistics for
//! the planner.
//!
//! Two sources ship here: an in-memory table (tests, small reference data)
//! and a Parquet directory source that pushes the projection mask into the
//! Parquet reader.

use crate::error::{Error, Result};
use crate::exec::batch::{value_at, ColumnarBatch, RowBatch};
use crate::exec::DEFAULT_BATCH_SIZE;
use crate::pushdown::PushdownPredicate;
use crate::value::{ColumnType, Value};
use arrow::array::BooleanArray;
use arrow::compute::filter_record_batch;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Time-travel options, passed verbatim to the source.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeTravel {
    SnapshotId(String),
    AsOfTime(i64),
}

/// Scan configuration.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub batch_size: usize,
    pub use_columnar_batches: bool,
    /// Whether returned batches own their memory (safe to keep) or share
    /// the scan iterator's buffers (valid only until the next pull)
    pub copy_batches: bool,
    pub time_travel: Option<TimeTravel>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            batch_size: DEFAULT_BATCH_SIZE,
            use_columnar_batches: false,
            copy_batches: true,
            time_travel: None,
        }
    }
}

/// One scan request handed to a source.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub table: String,
    /// Columns to project; `None` scans everything
    pub columns: Option<Vec<String>>,
    pub predicates: Vec<PushdownPredicate>,
    pub options: ScanOptions,
}

/// Planner-facing statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableStats {
    pub row_count: usize,
}

/// The columnar table library seam.
pub trait TabularSource: Send + Sync {
    fn scan_row_batches(
        &self,
        request: &ScanRequest,
    ) -> Result<Box<dyn Iterator<Item = Result<RowBatch>> + Send>>;

    fn scan_columnar_batches(
        &self,
        request: &ScanRequest,
    ) -> Result<Box<dyn Iterator<Item = Result<ColumnarBatch>> + Send>>;

    /// Native column types, when the backend schema is known.
    fn native_types(&self, table: &str) -> Option<HashMap<String, ColumnType>>;

    fn stats(&self, table: &str) -> Option<TableStats>;
}

/// Evaluate every pushdown predicate against one row.
fn row_matches(
    predicates: &[PushdownPredicate],
    columns: &[String],
    row: &[Value],
) -> bool {
    predicates.iter().all(|pred| {
        match columns.iter().position(|c| *c == pred.column) {
            Some(idx) => pred.matches(&row[idx]),
            // A predicate over a column the row does not carry filters
            // nothing.
            None => true,
        }
    })
}

fn project_indices(columns: &[String], requested: Option<&[String]>) -> Vec<usize> {
    match requested {
        None => (0..columns.len()).collect(),
        Some(wanted) => wanted
            .iter()
            .filter_map(|name| columns.iter().position(|c| c == name))
            .collect(),
    }
}

// ---------------------------------------------------------------------
// In-memory source
// ---------------------------------------------------------------------

/// One in-memory table.
#[derive(Debug, Clone)]
pub struct MemoryTable {
    pub columns: Vec<String>,
    pub types: HashMap<String, ColumnType>,
    pub rows: Vec<Vec<Value>>,
}

impl MemoryTable {
    pub fn new(columns: Vec<(&str, ColumnType)>, rows: Vec<Vec<Value>>) -> Self {
        let types = columns
            .iter()
            .map(|(name, t)| ((*name).to_string(), *t))
            .collect();
        MemoryTable {
            columns: columns.into_iter().map(|(name, _)| name.to_string()).collect(),
            types,
            rows,
        }
    }
}

/// Source over a set of named in-memory tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryTableSource {
    tables: HashMap<String, MemoryTable>,
}

impl MemoryTableSource {
    pub fn new() -> Self {
        MemoryTableSource::default()
    }

    pub fn add_table(&mut self, name: impl Into<String>, table: MemoryTable) {
        self.tables.insert(name.into(), table);
    }

    fn table(&self, name: &str) -> Result<&MemoryTable> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::not_found(format!("no table named '{name}'")))
    }

    fn scan_rows(&self, request: &ScanRequest) -> Result<Vec<RowBatch>> {
        let table = self.table(&request.table)?;
        let indices = project_indices(&table.columns, request.columns.as_deref());
        let out_columns: Vec<String> =
            indices.iter().map(|&i| table.columns[i].clone()).collect();

        let filtered: Vec<Vec<Value>> = table
            .rows
            .iter()
            .filter(|row| row_matches(&request.predicates, &table.columns, row))
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();

        let batch_size = request.options.batch_size.max(1);
        let mut batches: Vec<RowBatch> = filtered
            .chunks(batch_size)
            .map(|chunk| RowBatch::new(out_columns.clone(), chunk.to_vec()))
            .collect();
        if batches.is_empty() {
            batches.push(RowBatch::empty(out_columns));
        }
        Ok(batches)
    }
}

impl TabularSource for MemoryTableSource {
    fn scan_row_batches(
        &self,
        request: &ScanRequest,
    ) -> Result<Box<dyn Iterator<Item = Result<RowBatch>> + Send>> {
        let batches = self.scan_rows(request)?;
        Ok(Box::new(batches.into_iter().map(Ok)))
    }

    fn scan_columnar_batches(
        &self,
        request: &ScanRequest,
    ) -> Result<Box<dyn Iterator<Item = Result<ColumnarBatch>> + Send>> {
        let owned = request.options.copy_batches;
        let batches = self.scan_rows(request)?;
        Ok(Box::new(batches.into_iter().map(move |rows| {
            let record = rows.to_record_batch()?;
            Ok(ColumnarBatch { batch: record, owned })
        })))
    }

    fn native_types(&self, table: &str) -> Option<HashMap<String, ColumnType>> {
        self.tables.get(table).map(|t| t.types.clone())
    }

    fn stats(&self, table: &str) -> Option<TableStats> {
        self.tables.get(table).map(|t| TableStats { row_count: t.rows.len() })
    }
}

// ---------------------------------------------------------------------
// Parquet source
// ---------------------------------------------------------------------

/// Source over one Parquet file per table. The projection is pushed into
/// the Parquet reader; predicates are evaluated per batch before it leaves
/// the source.
#[derive(Debug, Clone, Default)]
pub struct ParquetTableSource {
    files: HashMap<String, PathBuf>,
    stats: HashMap<String, TableStats>,
}

impl ParquetTableSource {
    pub fn new() -> Self {
        ParquetTableSource::default()
    }

    pub fn add_table(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) {
        self.files.insert(name.into(), path.into());
    }

    pub fn set_stats(&mut self, name: impl Into<String>, stats: TableStats) {
        self.stats.insert(name.into(), stats);
    }

    /// Write a row batch out as a Parquet table and register it.
    pub fn write_table(
        &mut self,
        name: impl Into<String>,
        path: impl AsRef<Path>,
        rows: &RowBatch,
    ) -> Result<()> {
        let record = rows.to_record_batch()?;
        let file = File::create(path.as_ref())?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut writer = ArrowWriter::try_new(file, record.schema(), Some(props))?;
        writer.write(&record)?;
        writer.close()?;
        let name = name.into();
        self.stats.insert(name.clone(), TableStats { row_count: rows.num_rows() });
        self.files.insert(name, path.as_ref().to_path_buf());
        Ok(())
    }

    fn open_reader(
        &self,
        request: &ScanRequest,
    ) -> Result<parquet::arrow::arrow_reader::ParquetRecordBatchReader> {
        let path = self.files.get(&request.table).ok_or_else(|| {
            Error::not_found(format!("no Parquet table named '{}'", request.table))
        })?;
        let file = File::open(path)?;
        let mut builder = ParquetRecordBatchReaderBuilder::try_new(file)?
            .with_batch_size(request.options.batch_size.max(1));

        if let Some(wanted) = &request.columns {
            let schema = builder.schema().clone();
            let indices: Vec<usize> = wanted
                .iter()
                .filter_map(|name| schema.index_of(name).ok())
                .collect();
            let mask =
                parquet::arrow::ProjectionMask::roots(builder.parquet_schema(), indices);
            builder = builder.with_projection(mask);
        }

        Ok(builder.build()?)
    }

    fn apply_predicates(
        batch: RecordBatch,
        predicates: &[PushdownPredicate],
    ) -> Result<RecordBatch> {
        if predicates.is_empty() {
            return Ok(batch);
        }
        let schema = batch.schema();
        let columns: Vec<String> =
            schema.fields().iter().map(|f| f.name().clone()).collect();
        let mut keep = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            let mut values = Vec::with_capacity(columns.len());
            for col in 0..columns.len() {
                values.push(value_at(&batch, col, row)?);
            }
            keep.push(row_matches(predicates, &columns, &values));
        }
        Ok(filter_record_batch(&batch, &BooleanArray::from(keep))?)
    }
}

impl TabularSource for ParquetTableSource {
    fn scan_row_batches(
        &self,
        request: &ScanRequest,
    ) -> Result<Box<dyn Iterator<Item = Result<RowBatch>> + Send>> {
        let columnar = self.scan_columnar_batches(request)?;
        Ok(Box::new(columnar.map(|batch| batch?.to_row_batch())))
    }

    fn scan_columnar_batches(
        &self,
        request: &ScanRequest,
    ) -> Result<Box<dyn Iterator<Item = Result<ColumnarBatch>> + Send>> {
        let reader = self.open_reader(request)?;
        let predicates = request.predicates.clone();
        let owned = request.options.copy_batches;
        Ok(Box::new(reader.map(move |next| {
            let batch = next.map_err(Error::from)?;
            let filtered = ParquetTableSource::apply_predicates(batch, &predicates)?;
            Ok(ColumnarBatch { batch: filtered, owned })
        })))
    }

    fn native_types(&self, table: &str) -> Option<HashMap<String, ColumnType>> {
        let path = self.files.get(table)?;
        let file = File::open(path).ok()?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file).ok()?;
        let schema = builder.schema();
        let mut types = HashMap::new();
        for field in schema.fields() {
            let column_type = match field.data_type() {
                arrow::datatypes::DataType::Int64 => ColumnType::Int,
                arrow::datatypes::DataType::Float64 => ColumnType::Float,
                arrow::datatypes::DataType::Boolean => ColumnType::Bool,
                arrow::datatypes::DataType::Utf8 => ColumnType::String,
                arrow::datatypes::DataType::Timestamp(_, _) => ColumnType::Timestamp,
                arrow::datatypes::DataType::Date32 => ColumnType::Date,
                _ => continue,
            };
            types.insert(field.name().clone(), column_type);
        }
        Some(types)
    }

    fn stats(&self, table: &str) -> Option<TableStats> {
        self.stats.get(table).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pushdown::{PredicateValue, PushdownOp};

    fn people() -> MemoryTable {
        MemoryTable::new(
            vec![("id", ColumnType::Int), ("name", ColumnType::String), ("age", ColumnType::Int)],
            vec![
                vec![Value::Int(1), Value::from("ann"), Value::Int(34)],
                vec![Value::Int(2), Value::from("bob"), Value::Int(19)],
                vec![Value::Int(3), Value::from("cat"), Value::Int(52)],
            ],
        )
    }

    fn request(table: &str) -> ScanRequest {
        ScanRequest {
            table: table.to_string(),
            columns: None,
            predicates: Vec::new(),
            options: ScanOptions::default(),
        }
    }

    #[test]
    fn test_memory_scan_with_predicate_and_projection() {
        let mut source = MemoryTableSource::new();
        source.add_table("people", people());

        let mut req = request("people");
        req.columns = Some(vec!["name".to_string()]);
        req.predicates = vec![PushdownPredicate {
            op: PushdownOp::Gt,
            column: "age".to_string(),
            value: PredicateValue::Scalar(Value::Int(30)),
        }];

        let batches: Vec<RowBatch> =
            source.scan_row_batches(&req).unwrap().collect::<Result<_>>().unwrap();
        let rows: Vec<_> = batches.iter().flat_map(|b| b.rows.clone()).collect();
        assert_eq!(rows, vec![vec![Value::from("ann")], vec![Value::from("cat")]]);
        assert_eq!(batches[0].columns.as_slice(), ["name".to_string()]);
    }

    #[test]
    fn test_memory_scan_batch_size() {
        let mut source = MemoryTableSource::new();
        source.add_table("people", people());
        let mut req = request("people");
        req.options.batch_size = 2;
        let batches: Vec<RowBatch> =
            source.scan_row_batches(&req).unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].num_rows(), 2);
        assert_eq!(batches[1].num_rows(), 1);
    }

    #[test]
    fn test_memory_stats_and_types() {
        let mut source = MemoryTableSource::new();
        source.add_table("people", people());
        assert_eq!(source.stats("people"), Some(TableStats { row_count: 3 }));
        assert_eq!(source.native_types("people").unwrap().get("age"), Some(&ColumnType::Int));
        assert!(source.stats("absent").is_none());
    }

    #[test]
    fn test_parquet_round_trip_with_projection_pushdown() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("people.parquet");

        let rows = RowBatch::new(
            vec!["id".to_string(), "name".to_string(), "age".to_string()],
            people().rows,
        );
        let mut source = ParquetTableSource::new();
        source.write_table("people", &path, &rows).unwrap();

        let mut req = request("people");
        req.columns = Some(vec!["name".to_string(), "age".to_string()]);
        req.predicates = vec![PushdownPredicate::eq("name", Value::from("bob"))];

        let batches: Vec<ColumnarBatch> =
            source.scan_columnar_batches(&req).unwrap().collect::<Result<_>>().unwrap();
        let all: Vec<Vec<Value>> = batches
            .iter()
            .map(|b| b.to_row_batch())
            .collect::<Result<Vec<_>>>()
            .unwrap()
            .into_iter()
            .flat_map(|b| b.rows)
            .collect();
        assert_eq!(all, vec![vec![Value::from("bob"), Value::Int(19)]]);
        assert_eq!(source.stats("people"), Some(TableStats { row_count: 3 }));
    }
}
