//! Join Graph
//!
//! Every RefObjectMap contributes one directed edge
//! `child-table -> parent-table`, labeled with its predicate IRI and the
//! (possibly composite) column pairs. Edges are indexed by participating
//! table (both endpoints) and by predicate IRI, which is what the planner
//! consults for connectivity and orientation.

use crate::mapping::{MappingSet, ObjectMap};
use std::collections::HashMap;

/// One foreign-key edge between two logical tables.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinEdge {
    pub child_table: String,
    pub parent_table: String,
    /// (child column, parent column) pairs
    pub columns: Vec<(String, String)>,
    /// Predicate IRI the reference was declared under
    pub predicate: String,
    /// Estimated selectivity, if statistics provided one
    pub selectivity: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct JoinGraph {
    edges: Vec<JoinEdge>,
    by_table: HashMap<String, Vec<usize>>,
    by_predicate: HashMap<String, Vec<usize>>,
}

impl JoinGraph {
    /// Build the graph from every RefObjectMap in a mapping set. References
    /// to a TriplesMap that is not in the set are skipped.
    pub fn from_mappings(mappings: &MappingSet) -> Self {
        let mut graph = JoinGraph::default();
        for (table, map) in mappings.iter() {
            for (predicate, object_map) in &map.predicates {
                if let ObjectMap::Ref { parent_triples_map, join_conditions } = object_map {
                    let Some(parent) = mappings.by_iri(parent_triples_map) else {
                        continue;
                    };
                    graph.add_edge(JoinEdge {
                        child_table: table.to_string(),
                        parent_table: parent.logical_table.name.clone(),
                        columns: join_conditions
                            .iter()
                            .map(|jc| (jc.child.clone(), jc.parent.clone()))
                            .collect(),
                        predicate: predicate.clone(),
                        selectivity: None,
                    });
                }
            }
        }
        graph
    }

    pub fn add_edge(&mut self, edge: JoinEdge) {
        let idx = self.edges.len();
        self.by_table.entry(edge.child_table.clone()).or_default().push(idx);
        self.by_table.entry(edge.parent_table.clone()).or_default().push(idx);
        self.by_predicate.entry(edge.predicate.clone()).or_default().push(idx);
        self.edges.push(edge);
    }

    pub fn edges(&self) -> &[JoinEdge] {
        &self.edges
    }

    /// Edges a table participates in, on either side.
    pub fn edges_for_table(&self, table: &str) -> Vec<&JoinEdge> {
        self.by_table
            .get(table)
            .map(|indices| indices.iter().map(|&i| &self.edges[i]).collect())
            .unwrap_or_default()
    }

    pub fn edges_for_predicate(&self, predicate: &str) -> Vec<&JoinEdge> {
        self.by_predicate
            .get(predicate)
            .map(|indices| indices.iter().map(|&i| &self.edges[i]).collect())
            .unwrap_or_default()
    }

    /// The first edge connecting two tables, in either direction.
    pub fn edge_between(&self, a: &str, b: &str) -> Option<&JoinEdge> {
        self.edges_for_table(a).into_iter().find(|edge| {
            (edge.child_table == a && edge.parent_table == b)
                || (edge.child_table == b && edge.parent_table == a)
        })
    }

    /// All join columns a table contributes to any edge.
    pub fn join_columns_for_table(&self, table: &str) -> Vec<String> {
        let mut columns = Vec::new();
        for edge in self.edges_for_table(table) {
            for (child_col, parent_col) in &edge.columns {
                if edge.child_table == table && !columns.contains(child_col) {
                    columns.push(child_col.clone());
                }
                if edge.parent_table == table && !columns.contains(parent_col) {
                    columns.push(parent_col.clone());
                }
            }
        }
        columns
    }
}
