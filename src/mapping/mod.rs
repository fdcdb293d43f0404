//! R2RML Mapping Model
//!
//! A declarative relational-to-RDF mapping: logical tables, subject
//! templates, predicate-to-column maps, and reference (foreign-key) maps.
//! Two front ends, a Turtle subset and a JSON-LD reader, parse into the
//! same property-tree form and MUST produce identical mapping records.
//!
//! The vocabulary handled is the R2RML core:
//! `rr:logicalTable`, `rr:tableName`, `rr:subjectMap`, `rr:template`,
//! `rr:class`, `rr:predicateObjectMap`, `rr:predicate`, `rr:objectMap`,
//! `rr:column`, `rr:datatype`, `rr:parentTriplesMap`, `rr:joinCondition`,
//! `rr:child`, `rr:parent`.

pub mod join_graph;
pub mod jsonld;
pub mod turtle;

pub use join_graph::{JoinEdge, JoinGraph};
pub use jsonld::parse_jsonld;
pub use turtle::parse_turtle;

use crate::error::{Error, Result};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};

pub const RR_NS: &str = "http://www.w3.org/ns/r2rml#";
pub const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema#";

/// Property tree produced by both parsers: a subject's properties keyed by
/// full predicate IRI, with nested blank nodes inlined.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// An IRI reference (possibly a fragment like `#CustomerMap`)
    Iri(String),
    /// A string literal
    Literal(String),
    /// A blank node: property list in declaration order
    Blank(Vec<(String, Node)>),
}

impl Node {
    fn literal(&self) -> Option<&str> {
        match self {
            Node::Literal(s) => Some(s),
            _ => None,
        }
    }

    fn iri(&self) -> Option<&str> {
        match self {
            Node::Iri(s) => Some(s),
            _ => None,
        }
    }
}

/// A parsed document: top-level subjects in declaration order.
pub type Document = Vec<(String, Vec<(String, Node)>)>;

/// The logical table a TriplesMap reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalTable {
    /// Qualified table name, e.g. `public.customer`
    pub name: String,
}

/// Subject IRI template with its extracted `{column}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectTemplate {
    pub template: String,
    pub columns: Vec<String>,
}

impl SubjectTemplate {
    pub fn parse(template: &str) -> Self {
        let re = Regex::new(r"\{([^{}]+)\}").expect("template regex is valid");
        let columns = re
            .captures_iter(template)
            .map(|cap| cap[1].to_string())
            .collect();
        SubjectTemplate { template: template.to_string(), columns }
    }
}

/// One join condition of a RefObjectMap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinCondition {
    pub child: String,
    pub parent: String,
}

/// Right-hand side of a predicate-object pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectMap {
    /// A TermMap: one column, with an optional declared datatype IRI
    Column { name: String, datatype: Option<String> },
    /// A RefObjectMap: a foreign-key reference to another TriplesMap
    Ref { parent_triples_map: String, join_conditions: Vec<JoinCondition> },
}

/// One parsed TriplesMap.
#[derive(Debug, Clone, PartialEq)]
pub struct TriplesMap {
    pub iri: String,
    pub logical_table: LogicalTable,
    pub subject_template: SubjectTemplate,
    pub class: Option<String>,
    /// predicate IRI -> object map, in a stable order
    pub predicates: BTreeMap<String, ObjectMap>,
}

/// All mappings of a document, keyed by logical table name.
#[derive(Debug, Clone, Default)]
pub struct MappingSet {
    by_table: BTreeMap<String, TriplesMap>,
    table_by_iri: HashMap<String, String>,
}

impl MappingSet {
    pub fn get(&self, table: &str) -> Option<&TriplesMap> {
        self.by_table.get(table)
    }

    pub fn by_iri(&self, iri: &str) -> Option<&TriplesMap> {
        self.table_by_iri.get(iri).and_then(|t| self.by_table.get(t))
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.by_table.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TriplesMap)> {
        self.by_table.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.by_table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_table.is_empty()
    }
}

/// Interpret a parsed document into mapping records. Object maps declared
/// with their own IRI are interpreted once and reused by reference.
pub fn interpret(document: &Document) -> Result<MappingSet> {
    let by_subject: HashMap<&str, &Vec<(String, Node)>> =
        document.iter().map(|(s, props)| (s.as_str(), props)).collect();

    let mut object_map_cache: HashMap<String, ObjectMap> = HashMap::new();
    let mut set = MappingSet::default();

    for (subject, props) in document {
        if !is_triples_map(props) {
            continue;
        }
        let map = interpret_triples_map(subject, props, &by_subject, &mut object_map_cache)?;
        set.table_by_iri.insert(map.iri.clone(), map.logical_table.name.clone());
        set.by_table.insert(map.logical_table.name.clone(), map);
    }

    if set.is_empty() {
        return Err(Error::invalid_configuration("mapping document declares no TriplesMap"));
    }
    Ok(set)
}

fn rr(term: &str) -> String {
    format!("{RR_NS}{term}")
}

fn is_triples_map(props: &[(String, Node)]) -> bool {
    props.iter().any(|(p, _)| *p == rr("logicalTable"))
}

fn interpret_triples_map(
    subject: &str,
    props: &[(String, Node)],
    by_subject: &HashMap<&str, &Vec<(String, Node)>>,
    object_map_cache: &mut HashMap<String, ObjectMap>,
) -> Result<TriplesMap> {
    let logical_table = props
        .iter()
        .find(|(p, _)| *p == rr("logicalTable"))
        .and_then(|(_, node)| property_literal(node, &rr("tableName"), by_subject))
        .map(|name| LogicalTable { name })
        .ok_or_else(|| {
            Error::invalid_configuration(format!("TriplesMap '{subject}' has no rr:tableName"))
        })?;

    let subject_map = props
        .iter()
        .find(|(p, _)| *p == rr("subjectMap"))
        .map(|(_, node)| resolve(node, by_subject))
        .ok_or_else(|| {
            Error::invalid_configuration(format!("TriplesMap '{subject}' has no rr:subjectMap"))
        })?;
    let template = subject_map
        .iter()
        .find(|(p, _)| *p == rr("template"))
        .and_then(|(_, node)| node.literal())
        .ok_or_else(|| {
            Error::invalid_configuration(format!("TriplesMap '{subject}' has no rr:template"))
        })?;
    let class = subject_map
        .iter()
        .find(|(p, _)| *p == rr("class"))
        .and_then(|(_, node)| node.iri())
        .map(str::to_string);

    let mut predicates = BTreeMap::new();
    for (_, node) in props.iter().filter(|(p, _)| *p == rr("predicateObjectMap")) {
        let pom = resolve(node, by_subject);
        let predicate = pom
            .iter()
            .find(|(p, _)| *p == rr("predicate"))
            .and_then(|(_, n)| n.iri())
            .ok_or_else(|| {
                Error::invalid_configuration(format!(
                    "predicateObjectMap of '{subject}' has no rr:predicate"
                ))
            })?
            .to_string();
        let object_node = pom
            .iter()
            .find(|(p, _)| *p == rr("objectMap"))
            .map(|(_, n)| n)
            .ok_or_else(|| {
                Error::invalid_configuration(format!(
                    "predicateObjectMap of '{subject}' has no rr:objectMap"
                ))
            })?;
        let object_map =
            interpret_object_map(subject, object_node, by_subject, object_map_cache)?;
        predicates.insert(predicate, object_map);
    }

    Ok(TriplesMap {
        iri: subject.to_string(),
        logical_table,
        subject_template: SubjectTemplate::parse(template),
        class,
        predicates,
    })
}

fn interpret_object_map(
    subject: &str,
    node: &Node,
    by_subject: &HashMap<&str, &Vec<(String, Node)>>,
    cache: &mut HashMap<String, ObjectMap>,
) -> Result<ObjectMap> {
    // Object maps declared with their own IRI are deduplicated by it.
    if let Some(iri) = node.iri() {
        if let Some(cached) = cache.get(iri) {
            return Ok(cached.clone());
        }
    }

    let props = resolve(node, by_subject);
    let object_map = if let Some(parent) =
        props.iter().find(|(p, _)| *p == rr("parentTriplesMap")).and_then(|(_, n)| n.iri())
    {
        let mut join_conditions = Vec::new();
        for (_, jc_node) in props.iter().filter(|(p, _)| *p == rr("joinCondition")) {
            let jc = resolve(jc_node, by_subject);
            let child = jc
                .iter()
                .find(|(p, _)| *p == rr("child"))
                .and_then(|(_, n)| n.literal())
                .ok_or_else(|| {
                    Error::invalid_configuration(format!(
                        "joinCondition of '{subject}' has no rr:child"
                    ))
                })?;
            let parent_col = jc
                .iter()
                .find(|(p, _)| *p == rr("parent"))
                .and_then(|(_, n)| n.literal())
                .ok_or_else(|| {
                    Error::invalid_configuration(format!(
                        "joinCondition of '{subject}' has no rr:parent"
                    ))
                })?;
            join_conditions
                .push(JoinCondition { child: child.to_string(), parent: parent_col.to_string() });
        }
        if join_conditions.is_empty() {
            return Err(Error::invalid_configuration(format!(
                "RefObjectMap of '{subject}' needs at least one rr:joinCondition"
            )));
        }
        ObjectMap::Ref { parent_triples_map: parent.to_string(), join_conditions }
    } else {
        let name = props
            .iter()
            .find(|(p, _)| *p == rr("column"))
            .and_then(|(_, n)| n.literal())
            .ok_or_else(|| {
                Error::invalid_configuration(format!(
                    "objectMap of '{subject}' has neither rr:column nor rr:parentTriplesMap"
                ))
            })?;
        let datatype = props
            .iter()
            .find(|(p, _)| *p == rr("datatype"))
            .and_then(|(_, n)| n.iri())
            .map(str::to_string);
        ObjectMap::Column { name: name.to_string(), datatype }
    };

    if let Some(iri) = node.iri() {
        cache.insert(iri.to_string(), object_map.clone());
    }
    Ok(object_map)
}

/// Follow an IRI reference to its top-level property list, or use the blank
/// node inline. A dangling reference resolves to an empty list.
fn resolve<'a>(node: &'a Node, by_subject: &HashMap<&str, &'a Vec<(String, Node)>>) -> Vec<(String, Node)> {
    match node {
        Node::Blank(props) => props.clone(),
        Node::Iri(iri) => by_subject.get(iri.as_str()).map(|p| (*p).clone()).unwrap_or_default(),
        Node::Literal(_) => Vec::new(),
    }
}

fn property_literal(
    node: &Node,
    property: &str,
    by_subject: &HashMap<&str, &Vec<(String, Node)>>,
) -> Option<String> {
    resolve(node, by_subject)
        .iter()
        .find(|(p, _)| p == property)
        .and_then(|(_, n)| n.literal())
        .map(str::to_string)
}
