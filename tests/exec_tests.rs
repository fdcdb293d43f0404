//! Operator Tree Integration Tests
//!
//! Tests for:
//! - Left-outer joins preserving the required side (Property 8)
//! - Implicit-group aggregation over empty input (Property 9)
//! - Vectorized-join equivalence with row-map mode (Property 10)
//! - UNION ordering (Property 11)

use flureedb::exec::collect_rows;
use flureedb::{
    AggregateFn, AggregateSpec, ColumnType, HashAggregateOp, HashJoinOp, JoinType, MemoryTable,
    MemoryTableSource, Operator, PredicateValue, PushdownOp, PushdownPredicate, ScanOp,
    ScanOptions, UnionOp, Value,
};
use std::collections::HashMap;
use std::sync::Arc;

// ============================================================================
// Test Helpers
// ============================================================================

fn int_rows(values: &[&[i64]]) -> Vec<Vec<Value>> {
    values
        .iter()
        .map(|row| row.iter().map(|&v| Value::Int(v)).collect())
        .collect()
}

fn scan(source: &Arc<MemoryTableSource>, table: &str) -> Box<dyn Operator> {
    Box::new(ScanOp::new(source.clone(), table, None, Vec::new(), ScanOptions::default()))
}

fn sorted(mut rows: Vec<HashMap<String, Value>>, key: &str) -> Vec<HashMap<String, Value>> {
    rows.sort_by_key(|r| format!("{:?}", r.get(key)));
    rows
}

// ============================================================================
// Left-Outer Preserves the Required Side (Property 8)
// ============================================================================

#[test]
fn test_left_outer_keeps_all_required_rows_with_nulls_for_missing() {
    let mut source = MemoryTableSource::new();
    source.add_table(
        "required",
        MemoryTable::new(vec![("k", ColumnType::Int)], int_rows(&[&[1], &[2], &[3]])),
    );
    source.add_table(
        "optional",
        MemoryTable::new(
            vec![("k2", ColumnType::Int), ("extra", ColumnType::String)],
            vec![
                vec![Value::Int(1), Value::from("one")],
                vec![Value::Int(3), Value::from("three")],
            ],
        ),
    );
    let source = Arc::new(source);

    // Required side is ALWAYS probe; optional side is ALWAYS build.
    let mut join = HashJoinOp::new(
        scan(&source, "optional"),
        scan(&source, "required"),
        JoinType::LeftOuter,
        vec!["k2".to_string()],
        vec!["k".to_string()],
    );
    let rows = sorted(collect_rows(&mut join).unwrap(), "k");

    assert_eq!(rows.len(), 3, "exactly one output row per required row");
    assert_eq!(rows[0].get("extra"), Some(&Value::from("one")));
    assert_eq!(rows[1].get("extra"), Some(&Value::Null), "key 2 has null optional columns");
    assert_eq!(rows[1].get("k2"), Some(&Value::Null));
    assert_eq!(rows[2].get("extra"), Some(&Value::from("three")));
}

// ============================================================================
// Implicit-Group Aggregation on Empty Input (Property 9)
// ============================================================================

#[test]
fn test_zero_rows_no_group_keys_emits_exactly_one_row() {
    let mut source = MemoryTableSource::new();
    source.add_table(
        "empty",
        MemoryTable::new(vec![("v", ColumnType::Int)], Vec::new()),
    );
    let source = Arc::new(source);

    let mut agg = HashAggregateOp::new(
        scan(&source, "empty"),
        Vec::new(),
        vec![
            AggregateSpec::new(AggregateFn::Count, None, "count"),
            AggregateSpec::new(AggregateFn::Sum, Some("v"), "sum"),
            AggregateSpec::new(AggregateFn::Avg, Some("v"), "avg"),
            AggregateSpec::new(AggregateFn::Min, Some("v"), "min"),
            AggregateSpec::new(AggregateFn::Max, Some("v"), "max"),
        ],
    );
    let rows = collect_rows(&mut agg).unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("count"), Some(&Value::Int(0)));
    assert_eq!(rows[0].get("sum"), Some(&Value::Int(0)));
    assert_eq!(rows[0].get("avg"), Some(&Value::Null));
    assert_eq!(rows[0].get("min"), Some(&Value::Null));
    assert_eq!(rows[0].get("max"), Some(&Value::Null));
}

// ============================================================================
// Vectorized-Join Equivalence (Property 10)
// ============================================================================

#[test]
fn test_vectorized_and_row_map_modes_agree_for_both_join_types() {
    let mut source = MemoryTableSource::new();
    source.add_table(
        "build",
        MemoryTable::new(
            vec![("id", ColumnType::Int), ("label", ColumnType::String)],
            vec![
                vec![Value::Int(1), Value::from("a")],
                vec![Value::Int(1), Value::from("a2")],
                vec![Value::Int(2), Value::from("b")],
            ],
        ),
    );
    source.add_table(
        "probe",
        MemoryTable::new(
            vec![("fk", ColumnType::Int), ("n", ColumnType::Int)],
            vec![
                vec![Value::Int(1), Value::Int(10)],
                vec![Value::Int(2), Value::Int(20)],
                vec![Value::Int(9), Value::Int(30)],
                vec![Value::Null, Value::Int(40)],
            ],
        ),
    );
    let source = Arc::new(source);

    for join_type in [JoinType::Inner, JoinType::LeftOuter] {
        let make = |vectorized: bool| {
            HashJoinOp::new(
                scan(&source, "build"),
                scan(&source, "probe"),
                join_type,
                vec!["id".to_string()],
                vec!["fk".to_string()],
            )
            .vectorized(vectorized)
        };

        let mut row_rows = collect_rows(&mut make(false)).unwrap();
        let mut vec_rows = collect_rows(&mut make(true)).unwrap();

        let key = |r: &HashMap<String, Value>| {
            (format!("{:?}", r.get("n")), format!("{:?}", r.get("label")))
        };
        row_rows.sort_by_key(key);
        vec_rows.sort_by_key(key);
        assert_eq!(row_rows, vec_rows, "modes must produce the same multiset for {join_type:?}");
    }
}

// ============================================================================
// UNION Ordering (Property 11)
// ============================================================================

#[test]
fn test_union_emits_child_one_then_child_two() {
    let mut source = MemoryTableSource::new();
    source.add_table(
        "one",
        MemoryTable::new(vec![("v", ColumnType::Int)], int_rows(&[&[1], &[2], &[3]])),
    );
    source.add_table(
        "two",
        MemoryTable::new(vec![("v", ColumnType::Int)], int_rows(&[&[100], &[200]])),
    );
    let source = Arc::new(source);

    let mut union = UnionOp::new(vec![scan(&source, "one"), scan(&source, "two")]);
    union.open().unwrap();
    let mut seen = Vec::new();
    while let Some(batch) = union.next_batch().unwrap() {
        for row in batch.into_rows().unwrap().rows {
            seen.push(row[0].clone());
        }
    }
    union.close();

    assert_eq!(
        seen,
        vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(100), Value::Int(200)]
    );
}

// ============================================================================
// Empty-Count (end-to-end scenario)
// ============================================================================

#[test]
fn test_count_star_with_no_matching_rows_returns_one_zero_row() {
    let mut source = MemoryTableSource::new();
    source.add_table(
        "t",
        MemoryTable::new(vec![("v", ColumnType::Int)], int_rows(&[&[1], &[2]])),
    );
    let source = Arc::new(source);

    // Scan with a predicate nothing satisfies.
    let scan = Box::new(ScanOp::new(
        source,
        "t",
        None,
        vec![PushdownPredicate {
            op: PushdownOp::Gt,
            column: "v".to_string(),
            value: PredicateValue::Scalar(Value::Int(100)),
        }],
        ScanOptions::default(),
    ));
    let mut agg = HashAggregateOp::new(
        scan,
        Vec::new(),
        vec![AggregateSpec::new(AggregateFn::Count, None, "n")],
    );
    let rows = collect_rows(&mut agg).unwrap();
    assert_eq!(rows.len(), 1, "one row, not zero");
    assert_eq!(rows[0].get("n"), Some(&Value::Int(0)));
}
