//! Plan Compiler
//!
//! From routed pattern groups, the join graph, and per-table statistics,
//! produces a greedy-ordered operator tree:
//!
//! 1. Each group becomes a Scan carrying its pushdown predicates and the
//!    columns it needs (predicate columns, subject-template columns, and the
//!    join columns of every edge touching its table).
//! 2. One group compiles to the bare Scan.
//! 3. Otherwise the join order is greedy: start with the smallest table,
//!    then repeatedly take the not-yet-joined table that shares an edge with
//!    the accumulated set and minimizes `accumulated-rows x new-rows x
//!    edge-selectivity` (absent selectivity = 1.0).
//! 4. HashJoins fold over that order. Inner joins probe from the fact
//!    (child) side and build from the dimension (parent) side; OPTIONAL
//!    groups always build so the required side is never dropped. When the
//!    caller trims `output_columns`, every intermediate join keeps the join
//!    keys that later steps still need.
//! 5. A table with no connecting edge is skipped with a warning; the
//!    planner never synthesizes a Cartesian product.
//!
//! Time-travel options propagate to every Scan.

pub mod stats;

pub use stats::StatsRegistry;

use crate::error::{Error, Result};
use crate::exec::batch::Batch;
use crate::exec::source::{ScanOptions, TabularSource, TimeTravel};
use crate::exec::{HashJoinOp, JoinType, Operator, ScanOp, DEFAULT_BATCH_SIZE};
use crate::mapping::{JoinEdge, JoinGraph, ObjectMap, TriplesMap};
use crate::pushdown::analyze::TriplePattern;
use crate::pushdown::PushdownPredicate;
use std::collections::HashSet;
use std::sync::Arc;

/// A unit the planner consumes: one mapping's worth of patterns plus the
/// predicates already annotated for pushdown.
#[derive(Debug, Clone)]
pub struct PatternGroup {
    pub mapping: TriplesMap,
    pub patterns: Vec<TriplePattern>,
    pub predicates: Vec<PushdownPredicate>,
    pub optional: bool,
}

impl PatternGroup {
    pub fn table(&self) -> &str {
        &self.mapping.logical_table.name
    }
}

/// Compilation options.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub use_columnar_batches: bool,
    pub copy_batches: bool,
    /// Convert row output to columnar at the plan root
    pub output_columnar_batches: bool,
    /// Use the vectorized hash-join kernel
    pub vectorized: bool,
    /// Columns the caller wants in the final output; `None` keeps all
    pub output_columns: Option<HashSet<String>>,
    pub batch_size: usize,
    pub time_travel: Option<TimeTravel>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            use_columnar_batches: false,
            copy_batches: true,
            output_columnar_batches: false,
            vectorized: false,
            output_columns: None,
            batch_size: DEFAULT_BATCH_SIZE,
            time_travel: None,
        }
    }
}

/// Compile pattern groups into an executable operator tree.
pub fn compile(
    source: Arc<dyn TabularSource>,
    groups: Vec<PatternGroup>,
    join_graph: &JoinGraph,
    stats: &StatsRegistry,
    options: &CompileOptions,
) -> Result<Box<dyn Operator>> {
    if groups.is_empty() {
        return Err(Error::invalid_configuration("no pattern groups to compile"));
    }

    if groups.len() == 1 {
        let group = groups.into_iter().next().expect("one group");
        let scan = build_scan(&source, &group, join_graph, options);
        return Ok(finish(Box::new(scan), options));
    }

    let order = greedy_order(&groups, join_graph, stats, source.as_ref());
    let mut ordered: Vec<&PatternGroup> = Vec::with_capacity(order.len());
    for idx in &order {
        ordered.push(&groups[*idx]);
    }

    // Join keys each later step consumes, so intermediate joins keep them
    // even under a trimmed output projection.
    let step_edges: Vec<Option<&JoinEdge>> = ordered
        .iter()
        .enumerate()
        .map(|(i, group)| {
            if i == 0 {
                None
            } else {
                edge_to_set(join_graph, &ordered[..i], group.table())
            }
        })
        .collect();

    let mut plan: Box<dyn Operator> =
        Box::new(build_scan(&source, ordered[0], join_graph, options));

    for (i, group) in ordered.iter().enumerate().skip(1) {
        let Some(edge) = step_edges[i] else {
            tracing::warn!(
                table = group.table(),
                "no connecting join edge; skipping table instead of emitting a Cartesian product"
            );
            continue;
        };

        let scan: Box<dyn Operator> = Box::new(build_scan(&source, group, join_graph, options));
        let new_is_child = edge.child_table == group.table();
        let (acc_keys, new_keys): (Vec<String>, Vec<String>) = if new_is_child {
            (
                edge.columns.iter().map(|(_, p)| p.clone()).collect(),
                edge.columns.iter().map(|(c, _)| c.clone()).collect(),
            )
        } else {
            (
                edge.columns.iter().map(|(c, _)| c.clone()).collect(),
                edge.columns.iter().map(|(_, p)| p.clone()).collect(),
            )
        };

        // Orientation. OPTIONAL: required (accumulated) side is ALWAYS the
        // probe. Inner: the fact (child) side probes, the dimension
        // (parent) side builds.
        let (build, probe, build_keys, probe_keys, join_type) = if group.optional {
            (scan, plan, new_keys, acc_keys, JoinType::LeftOuter)
        } else if new_is_child {
            (plan, scan, acc_keys, new_keys, JoinType::Inner)
        } else {
            (scan, plan, new_keys, acc_keys, JoinType::Inner)
        };

        let mut join = HashJoinOp::new(build, probe, join_type, build_keys, probe_keys)
            .vectorized(options.vectorized);

        if let Some(requested) = &options.output_columns {
            let mut kept = requested.clone();
            // Downstream-key augmentation: keys of every later join stay in
            // the intermediate output.
            for later in step_edges.iter().skip(i + 1).flatten() {
                for (child_col, parent_col) in &later.columns {
                    kept.insert(child_col.clone());
                    kept.insert(parent_col.clone());
                }
            }
            join = join.with_output_columns(kept);
        }

        plan = Box::new(join);
    }

    Ok(finish(plan, options))
}

/// Columns a group's scan must produce: pushdown predicate columns, the
/// columns its patterns project, subject-template columns, and the join
/// columns of every edge touching the table.
fn scan_columns(group: &PatternGroup, join_graph: &JoinGraph) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    let mut push = |name: &str| {
        if !columns.iter().any(|c| c == name) {
            columns.push(name.to_string());
        }
    };

    for predicate in &group.predicates {
        push(&predicate.column);
    }
    for pattern in &group.patterns {
        if let Some(ObjectMap::Column { name, .. }) =
            group.mapping.predicates.get(&pattern.predicate)
        {
            push(name);
        }
    }
    for column in &group.mapping.subject_template.columns {
        push(column);
    }
    for column in join_graph.join_columns_for_table(group.table()) {
        push(&column);
    }
    columns
}

fn build_scan(
    source: &Arc<dyn TabularSource>,
    group: &PatternGroup,
    join_graph: &JoinGraph,
    options: &CompileOptions,
) -> ScanOp {
    let scan_options = ScanOptions {
        batch_size: options.batch_size,
        use_columnar_batches: options.use_columnar_batches,
        copy_batches: options.copy_batches,
        time_travel: options.time_travel.clone(),
    };
    ScanOp::new(
        source.clone(),
        group.table(),
        Some(scan_columns(group, join_graph)),
        group.predicates.clone(),
        scan_options,
    )
}

/// Greedy join order over group indices: smallest required table first,
/// then repeatedly the connected table minimizing the cost product.
fn greedy_order(
    groups: &[PatternGroup],
    join_graph: &JoinGraph,
    stats: &StatsRegistry,
    source: &dyn TabularSource,
) -> Vec<usize> {
    let row_count = |group: &PatternGroup| -> f64 {
        stats
            .resolve(group.table(), source)
            .map(|s| s.row_count as f64)
            .unwrap_or(1000.0)
    };

    let mut remaining: Vec<usize> = (0..groups.len()).collect();

    // Seed with the smallest required group; fall back to the smallest
    // overall when everything is OPTIONAL.
    let seed_pos = remaining
        .iter()
        .enumerate()
        .filter(|(_, &idx)| !groups[idx].optional)
        .min_by(|(_, &a), (_, &b)| {
            row_count(&groups[a]).total_cmp(&row_count(&groups[b]))
        })
        .map(|(pos, _)| pos)
        .unwrap_or_else(|| {
            remaining
                .iter()
                .enumerate()
                .min_by(|(_, &a), (_, &b)| {
                    row_count(&groups[a]).total_cmp(&row_count(&groups[b]))
                })
                .map(|(pos, _)| pos)
                .unwrap_or(0)
        });

    let mut order = vec![remaining.remove(seed_pos)];
    let mut acc_rows = row_count(&groups[order[0]]);

    while !remaining.is_empty() {
        let acc_groups: Vec<&PatternGroup> = order.iter().map(|&i| &groups[i]).collect();
        let candidate = remaining
            .iter()
            .enumerate()
            .filter_map(|(pos, &idx)| {
                let group = &groups[idx];
                let edge = edge_to_set(join_graph, &acc_groups, group.table())?;
                let selectivity = edge.selectivity.unwrap_or(1.0);
                let cost = acc_rows * row_count(group) * selectivity;
                Some((pos, idx, cost))
            })
            .min_by(|(_, _, a), (_, _, b)| a.total_cmp(b));

        match candidate {
            Some((pos, idx, _)) => {
                let group = &groups[idx];
                let edge = edge_to_set(join_graph, &acc_groups, group.table());
                let selectivity = edge.and_then(|e| e.selectivity).unwrap_or(1.0);
                acc_rows = (acc_rows * row_count(group) * selectivity).max(1.0);
                order.push(idx);
                remaining.remove(pos);
            }
            None => {
                // Disconnected tables still get a slot so compile() can warn
                // and skip them deterministically.
                order.push(remaining.remove(0));
            }
        }
    }
    order
}

/// First edge connecting the accumulated set of groups to a table.
fn edge_to_set<'g>(
    join_graph: &'g JoinGraph,
    acc: &[&PatternGroup],
    table: &str,
) -> Option<&'g JoinEdge> {
    acc.iter().find_map(|group| join_graph.edge_between(group.table(), table))
}

/// Apply the root-level output conversion when requested.
fn finish(plan: Box<dyn Operator>, options: &CompileOptions) -> Box<dyn Operator> {
    if options.output_columnar_batches {
        Box::new(ColumnarizeOp { child: plan })
    } else {
        plan
    }
}

/// Adapter converting row batches to owned columnar batches at the plan
/// root.
struct ColumnarizeOp {
    child: Box<dyn Operator>,
}

impl Operator for ColumnarizeOp {
    fn open(&mut self) -> Result<()> {
        self.child.open()
    }

    fn next_batch(&mut self) -> Result<Option<Batch>> {
        match self.child.next_batch()? {
            None => Ok(None),
            Some(Batch::Columnar(c)) => Ok(Some(Batch::Columnar(c))),
            Some(Batch::Rows(rows)) => {
                let record = rows.to_record_batch()?;
                Ok(Some(Batch::Columnar(crate::exec::batch::ColumnarBatch::owned(record))))
            }
        }
    }

    fn close(&mut self) {
        self.child.close();
    }

    fn estimated_rows(&self) -> usize {
        self.child.estimated_rows()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::collect_rows;
    use crate::exec::source::{MemoryTable, MemoryTableSource, TableStats};
    use crate::mapping::parse_turtle;
    use crate::value::{ColumnType, Value};

    const MAPPING: &str = r##"
        @prefix rr: <http://www.w3.org/ns/r2rml#> .
        @prefix ex: <http://example.com/ns#> .
        @prefix xsd: <http://www.w3.org/2001/XMLSchema#> .

        <#CustomerMap>
            rr:logicalTable [ rr:tableName "customer" ] ;
            rr:subjectMap [ rr:template "http://ex/c/{id}" ] ;
            rr:predicateObjectMap [
                rr:predicate ex:name ;
                rr:objectMap [ rr:column "name" ; rr:datatype xsd:string ]
            ] .

        <#OrderMap>
            rr:logicalTable [ rr:tableName "order" ] ;
            rr:subjectMap [ rr:template "http://ex/o/{order_id}" ] ;
            rr:predicateObjectMap [
                rr:predicate ex:amount ;
                rr:objectMap [ rr:column "amount" ; rr:datatype xsd:integer ]
            ] ;
            rr:predicateObjectMap [
                rr:predicate ex:customer ;
                rr:objectMap [
                    rr:parentTriplesMap <#CustomerMap> ;
                    rr:joinCondition [ rr:child "customer_id" ; rr:parent "id" ]
                ]
            ] .
    "##;

    fn tables() -> Arc<MemoryTableSource> {
        let mut source = MemoryTableSource::new();
        source.add_table(
            "customer",
            MemoryTable::new(
                vec![("id", ColumnType::Int), ("name", ColumnType::String)],
                vec![
                    vec![Value::Int(1), Value::from("ann")],
                    vec![Value::Int(2), Value::from("bob")],
                ],
            ),
        );
        source.add_table(
            "order",
            MemoryTable::new(
                vec![
                    ("order_id", ColumnType::Int),
                    ("customer_id", ColumnType::Int),
                    ("amount", ColumnType::Int),
                ],
                vec![
                    vec![Value::Int(100), Value::Int(1), Value::Int(5)],
                    vec![Value::Int(101), Value::Int(1), Value::Int(7)],
                    vec![Value::Int(102), Value::Int(3), Value::Int(9)],
                ],
            ),
        );
        Arc::new(source)
    }

    fn pattern(pred: &str, var: &str) -> TriplePattern {
        use crate::pushdown::analyze::Term;
        TriplePattern::new(Term::var("s"), format!("http://example.com/ns#{pred}"), Term::var(var))
    }

    fn groups(optional_customer: bool) -> Vec<PatternGroup> {
        let set = parse_turtle(MAPPING).unwrap();
        vec![
            PatternGroup {
                mapping: set.get("order").unwrap().clone(),
                patterns: vec![pattern("amount", "amt")],
                predicates: Vec::new(),
                optional: false,
            },
            PatternGroup {
                mapping: set.get("customer").unwrap().clone(),
                patterns: vec![pattern("name", "n")],
                predicates: Vec::new(),
                optional: optional_customer,
            },
        ]
    }

    fn graph() -> JoinGraph {
        JoinGraph::from_mappings(&parse_turtle(MAPPING).unwrap())
    }

    #[test]
    fn test_single_group_compiles_to_scan() {
        let set = parse_turtle(MAPPING).unwrap();
        let group = PatternGroup {
            mapping: set.get("customer").unwrap().clone(),
            patterns: vec![pattern("name", "n")],
            predicates: Vec::new(),
            optional: false,
        };
        let mut plan = compile(
            tables(),
            vec![group],
            &graph(),
            &StatsRegistry::new(),
            &CompileOptions::default(),
        )
        .unwrap();
        let rows = collect_rows(plan.as_mut()).unwrap();
        assert_eq!(rows.len(), 2);
        // Scan projects the template column and the predicate column.
        assert!(rows[0].contains_key("id"));
        assert!(rows[0].contains_key("name"));
    }

    #[test]
    fn test_two_table_inner_join() {
        let mut plan = compile(
            tables(),
            groups(false),
            &graph(),
            &StatsRegistry::new(),
            &CompileOptions::default(),
        )
        .unwrap();
        let rows = collect_rows(plan.as_mut()).unwrap();
        // Orders 100 and 101 join customer 1; order 102 has no customer.
        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert_eq!(row.get("name"), Some(&Value::from("ann")));
        }
    }

    #[test]
    fn test_optional_group_preserves_required_rows() {
        let mut plan = compile(
            tables(),
            groups(true),
            &graph(),
            &StatsRegistry::new(),
            &CompileOptions::default(),
        )
        .unwrap();
        let rows = collect_rows(plan.as_mut()).unwrap();
        assert_eq!(rows.len(), 3, "every order must survive the OPTIONAL join");
        let unmatched: Vec<_> =
            rows.iter().filter(|r| r.get("name") == Some(&Value::Null)).collect();
        assert_eq!(unmatched.len(), 1);
    }

    #[test]
    fn test_stats_drive_the_seed_choice() {
        let mut stats = StatsRegistry::new();
        stats.set("order", TableStats { row_count: 1_000_000 });
        stats.set("customer", TableStats { row_count: 10 });
        let order = greedy_order(&groups(false), &graph(), &stats, tables().as_ref());
        // customer (index 1) is smaller, so it seeds the order.
        assert_eq!(order, vec![1, 0]);
    }

    #[test]
    fn test_vectorized_plan_matches_row_plan() {
        let row_opts = CompileOptions::default();
        let vec_opts = CompileOptions {
            vectorized: true,
            use_columnar_batches: true,
            ..CompileOptions::default()
        };
        let mut row_plan = compile(
            tables(),
            groups(false),
            &graph(),
            &StatsRegistry::new(),
            &row_opts,
        )
        .unwrap();
        let mut vec_plan = compile(
            tables(),
            groups(false),
            &graph(),
            &StatsRegistry::new(),
            &vec_opts,
        )
        .unwrap();

        let sort = |rows: &mut Vec<std::collections::HashMap<String, Value>>| {
            rows.sort_by_key(|r| format!("{:?}", r.get("order_id")));
        };
        let mut a = collect_rows(row_plan.as_mut()).unwrap();
        let mut b = collect_rows(vec_plan.as_mut()).unwrap();
        sort(&mut a);
        sort(&mut b);
        assert_eq!(a, b);
    }
}
