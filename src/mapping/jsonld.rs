//! JSON-LD Front End
//!
//! Reads the same R2RML vocabulary from a JSON-LD document. Keys expand
//! through the `@context` prefix table (with `rr`, `rdf`, and `xsd`
//! available even when no context declares them). Produces the same
//! property-tree form as the Turtle front end, so both parsers yield
//! identical mapping records.

use crate::error::{Error, Result};
use crate::mapping::{interpret, Document, MappingSet, Node, RDF_NS, RR_NS, XSD_NS};
use serde_json::Value;
use std::collections::HashMap;

/// Parse a JSON-LD mapping document into mapping records.
pub fn parse_jsonld(input: &str) -> Result<MappingSet> {
    let value: Value = serde_json::from_str(input)?;
    let document = to_document(&value)?;
    interpret(&document)
}

/// Properties whose string values are IRI references (the compact JSON-LD
/// form of `@type: @id`).
fn iri_valued(property: &str) -> bool {
    property == format!("{RR_NS}predicate")
        || property == format!("{RR_NS}class")
        || property == format!("{RR_NS}parentTriplesMap")
        || property == format!("{RR_NS}datatype")
        || property == format!("{RDF_NS}type")
}

struct Context {
    prefixes: HashMap<String, String>,
}

impl Context {
    fn from_value(value: Option<&Value>) -> Self {
        let mut prefixes = HashMap::new();
        prefixes.insert("rr".to_string(), RR_NS.to_string());
        prefixes.insert("rdf".to_string(), RDF_NS.to_string());
        prefixes.insert("xsd".to_string(), XSD_NS.to_string());
        if let Some(Value::Object(map)) = value {
            for (key, val) in map {
                if let Value::String(iri) = val {
                    prefixes.insert(key.clone(), iri.clone());
                }
            }
        }
        Context { prefixes }
    }

    /// Expand `prefix:local` against the prefix table; keys and references
    /// without a declared prefix pass through untouched.
    fn expand(&self, term: &str) -> String {
        if term.starts_with('@') || term.starts_with("http://") || term.starts_with("https://") {
            return term.to_string();
        }
        match term.split_once(':') {
            Some((prefix, local)) => match self.prefixes.get(prefix) {
                Some(base) => format!("{base}{local}"),
                None => term.to_string(),
            },
            None => term.to_string(),
        }
    }
}

fn to_document(value: &Value) -> Result<Document> {
    let context = Context::from_value(value.get("@context"));
    let nodes: Vec<&Value> = match value.get("@graph") {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(other) => vec![other],
        None => match value {
            Value::Array(items) => items.iter().collect(),
            Value::Object(_) => vec![value],
            _ => {
                return Err(Error::invalid_configuration(
                    "JSON-LD mapping must be an object or an array of objects",
                ))
            }
        },
    };

    let mut document = Document::new();
    for (i, node) in nodes.iter().enumerate() {
        let map = node.as_object().ok_or_else(|| {
            Error::invalid_configuration("JSON-LD graph entries must be objects")
        })?;
        let subject = map
            .get("@id")
            .and_then(Value::as_str)
            .map(|id| context.expand(id))
            .unwrap_or_else(|| format!("_:n{i}"));
        let props = to_properties(map, &context)?;
        document.push((subject, props));
    }
    Ok(document)
}

fn to_properties(
    map: &serde_json::Map<String, Value>,
    context: &Context,
) -> Result<Vec<(String, Node)>> {
    let mut props = Vec::new();
    for (key, value) in map {
        if key.starts_with('@') {
            continue;
        }
        let property = context.expand(key);
        match value {
            Value::Array(items) => {
                for item in items {
                    props.push((property.clone(), to_node(item, &property, context)?));
                }
            }
            other => props.push((property.clone(), to_node(other, &property, context)?)),
        }
    }
    Ok(props)
}

fn to_node(value: &Value, property: &str, context: &Context) -> Result<Node> {
    match value {
        Value::String(s) => {
            if iri_valued(property) {
                Ok(Node::Iri(context.expand(s)))
            } else {
                Ok(Node::Literal(s.clone()))
            }
        }
        Value::Object(map) => {
            // `{"@id": ...}` with no other keys is a reference
            if let Some(id) = map.get("@id").and_then(Value::as_str) {
                if map.len() == 1 {
                    return Ok(Node::Iri(context.expand(id)));
                }
            }
            Ok(Node::Blank(to_properties(map, context)?))
        }
        Value::Number(n) => Ok(Node::Literal(n.to_string())),
        Value::Bool(b) => Ok(Node::Literal(b.to_string())),
        other => Err(Error::invalid_configuration(format!(
            "unsupported JSON-LD value for '{property}': {other}"
        ))),
    }
}
