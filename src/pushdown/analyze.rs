//! Filter and VALUES Analysis
//!
//! A filter form is pushable iff every clause is a simple binary comparison
//! between one variable and one literal (flipped when the literal comes
//! first), a unary null test, an IN over literals, or a disjunction whose
//! arms are all equalities on the same variable (the form coalescing later
//! folds into one IN). Two-variable comparisons, function calls, and other
//! boolean combinators stay residual.
//!
//! Each pushable predicate is attached to the first triple pattern that
//! binds its variable. Three refusal conditions demote a filter to a
//! residual: the variable is never bound by a pattern in the group, the
//! predicate has no backing column in the routed mapping, or a value fails
//! coercion. Refusals are logged at debug level with the variable, target
//! type, and value.

use crate::mapping::{ObjectMap, TriplesMap};
use crate::pushdown::coerce::{coerce_literal, CoercionTarget};
use crate::pushdown::{coalesce, PredicateValue, PushdownOp, PushdownPredicate};
use crate::value::{ColumnType, Value};
use std::collections::HashMap;

/// One position of a triple pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Variable(String),
    Iri(String),
    Literal(Value),
}

impl Term {
    pub fn var(name: impl Into<String>) -> Self {
        Term::Variable(name.into())
    }
}

/// A SPARQL triple pattern routed to a mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct TriplePattern {
    pub subject: Term,
    /// Predicate IRI
    pub predicate: String,
    pub object: Term,
}

impl TriplePattern {
    pub fn new(subject: Term, predicate: impl Into<String>, object: Term) -> Self {
        TriplePattern { subject, predicate: predicate.into(), object }
    }
}

/// Operand of a filter comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOperand {
    Variable(String),
    Literal(Value),
}

/// Binary comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    /// Mirror the comparator when operands swap sides:
    /// `(< 5 ?x)` means `?x > 5`.
    pub fn flip(self) -> CompareOp {
        match self {
            CompareOp::Eq => CompareOp::Eq,
            CompareOp::Ne => CompareOp::Ne,
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Lte => CompareOp::Gte,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Gte => CompareOp::Lte,
        }
    }

    fn pushdown_op(self) -> PushdownOp {
        match self {
            CompareOp::Eq => PushdownOp::Eq,
            CompareOp::Ne => PushdownOp::Ne,
            CompareOp::Lt => PushdownOp::Lt,
            CompareOp::Lte => PushdownOp::Lte,
            CompareOp::Gt => PushdownOp::Gt,
            CompareOp::Gte => PushdownOp::Gte,
        }
    }
}

/// A SPARQL filter expression, pre-parsed by the query layer.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    Compare { op: CompareOp, lhs: FilterOperand, rhs: FilterOperand },
    IsNull(String),
    Bound(String),
    In { var: String, values: Vec<Value> },
    Or(Vec<FilterExpr>),
    And(Vec<FilterExpr>),
    Not(Box<FilterExpr>),
    Call { name: String, args: Vec<FilterOperand> },
}

/// A `VALUES ?x { lit1 ... litn }` block binding a single variable.
#[derive(Debug, Clone, PartialEq)]
pub struct ValuesClause {
    pub var: String,
    pub values: Vec<Value>,
}

/// Result of analyzing one pattern group.
#[derive(Debug, Clone, Default)]
pub struct AnalyzedGroup {
    /// Pushdown predicates attached per pattern, parallel to the input
    /// pattern slice
    pub by_pattern: Vec<Vec<PushdownPredicate>>,
    /// Filters that must run post-scan
    pub residual: Vec<FilterExpr>,
}

impl AnalyzedGroup {
    /// All pushable predicates in pattern order, equality sets coalesced
    /// into IN.
    pub fn pushdown(&self) -> Vec<PushdownPredicate> {
        coalesce(self.by_pattern.iter().flatten().cloned().collect())
    }
}

/// One pushable unit extracted from a filter.
#[derive(Debug, Clone)]
enum Candidate {
    Unary { var: String, op: PushdownOp },
    Compare { var: String, op: CompareOp, literal: Value },
    In { var: String, values: Vec<Value> },
}

impl Candidate {
    fn var(&self) -> &str {
        match self {
            Candidate::Unary { var, .. }
            | Candidate::Compare { var, .. }
            | Candidate::In { var, .. } => var,
        }
    }
}

/// Annotate a group's patterns with the predicates its filters and VALUES
/// blocks can push down.
pub fn annotate(
    patterns: &[TriplePattern],
    filters: &[FilterExpr],
    values: &[ValuesClause],
    mapping: &TriplesMap,
    native_types: Option<&HashMap<String, ColumnType>>,
) -> AnalyzedGroup {
    let mut analyzed =
        AnalyzedGroup { by_pattern: vec![Vec::new(); patterns.len()], residual: Vec::new() };

    for filter in filters {
        match pushable_candidates(filter) {
            None => analyzed.residual.push(filter.clone()),
            Some(candidates) => {
                match place_candidates(&candidates, patterns, mapping, native_types) {
                    Ok(placed) => {
                        for (idx, predicate) in placed {
                            analyzed.by_pattern[idx].push(predicate);
                        }
                    }
                    Err(reason) => {
                        tracing::debug!(filter = ?filter, %reason, "filter kept as residual");
                        analyzed.residual.push(filter.clone());
                    }
                }
            }
        }
    }

    for clause in values {
        let candidate =
            Candidate::In { var: clause.var.clone(), values: clause.values.clone() };
        match place_candidates(std::slice::from_ref(&candidate), patterns, mapping, native_types) {
            Ok(placed) => {
                for (idx, predicate) in placed {
                    analyzed.by_pattern[idx].push(predicate);
                }
            }
            Err(reason) => {
                tracing::debug!(var = %clause.var, %reason, "VALUES kept as residual");
                analyzed
                    .residual
                    .push(FilterExpr::In { var: clause.var.clone(), values: clause.values.clone() });
            }
        }
    }

    analyzed
}

/// Decompose a filter into pushable candidates; `None` when the form is not
/// pushable at all.
fn pushable_candidates(filter: &FilterExpr) -> Option<Vec<Candidate>> {
    match filter {
        FilterExpr::Compare { op, lhs, rhs } => match (lhs, rhs) {
            (FilterOperand::Variable(var), FilterOperand::Literal(lit)) => {
                Some(vec![Candidate::Compare { var: var.clone(), op: *op, literal: lit.clone() }])
            }
            (FilterOperand::Literal(lit), FilterOperand::Variable(var)) => Some(vec![
                Candidate::Compare { var: var.clone(), op: op.flip(), literal: lit.clone() },
            ]),
            _ => None,
        },
        FilterExpr::IsNull(var) => {
            Some(vec![Candidate::Unary { var: var.clone(), op: PushdownOp::IsNull }])
        }
        FilterExpr::Bound(var) => {
            Some(vec![Candidate::Unary { var: var.clone(), op: PushdownOp::NotNull }])
        }
        FilterExpr::In { var, values } => {
            Some(vec![Candidate::In { var: var.clone(), values: values.clone() }])
        }
        // A disjunction of equalities on one variable is IN in disguise.
        FilterExpr::Or(arms) => {
            let mut candidates = Vec::with_capacity(arms.len());
            for arm in arms {
                let mut arm_candidates = pushable_candidates(arm)?;
                if arm_candidates.len() != 1 {
                    return None;
                }
                let candidate = arm_candidates.pop()?;
                if !matches!(&candidate, Candidate::Compare { op: CompareOp::Eq, .. }) {
                    return None;
                }
                candidates.push(candidate);
            }
            // All arms must name the same variable.
            let first = candidates.first()?.var().to_string();
            if candidates.iter().all(|c| c.var() == first) {
                Some(candidates)
            } else {
                None
            }
        }
        FilterExpr::And(_) | FilterExpr::Not(_) | FilterExpr::Call { .. } => None,
    }
}

/// Bind candidates to pattern positions and coerce their values. Any
/// refusal cancels the whole filter.
fn place_candidates(
    candidates: &[Candidate],
    patterns: &[TriplePattern],
    mapping: &TriplesMap,
    native_types: Option<&HashMap<String, ColumnType>>,
) -> std::result::Result<Vec<(usize, PushdownPredicate)>, String> {
    let mut placed = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        let var = candidate.var();
        let (idx, pattern) = patterns
            .iter()
            .enumerate()
            .find(|(_, p)| matches!(&p.object, Term::Variable(v) if v == var))
            .ok_or_else(|| format!("variable ?{var} is not bound by a pattern in this group"))?;

        let (column, datatype) = match mapping.predicates.get(&pattern.predicate) {
            Some(ObjectMap::Column { name, datatype }) => (name.clone(), datatype.clone()),
            Some(ObjectMap::Ref { .. }) | None => {
                return Err(format!(
                    "predicate <{}> has no backing column in mapping '{}'",
                    pattern.predicate, mapping.iri
                ))
            }
        };

        let coerce_one = |value: &Value| -> std::result::Result<Value, String> {
            let target = match &datatype {
                Some(dt) => Some(CoercionTarget::Datatype(dt)),
                None => native_types
                    .and_then(|types| types.get(&column))
                    .map(|ct| CoercionTarget::Native(*ct)),
            };
            match target {
                Some(target) => coerce_literal(value, target).map_err(|err| {
                    format!("?{var}: {} (value '{value}')", err.message())
                }),
                // No declared datatype and no schema knowledge: the literal
                // is already column-shaped.
                None => Ok(value.clone()),
            }
        };

        let value = match candidate {
            Candidate::Unary { .. } => PredicateValue::None,
            Candidate::Compare { literal, .. } => {
                PredicateValue::Scalar(coerce_one(literal)?)
            }
            Candidate::In { values, .. } => {
                let mut coerced = Vec::with_capacity(values.len());
                for item in values {
                    coerced.push(coerce_one(item)?);
                }
                PredicateValue::List(coerced)
            }
        };
        let op = match candidate {
            Candidate::Unary { op, .. } => *op,
            Candidate::Compare { op, .. } => op.pushdown_op(),
            Candidate::In { .. } => PushdownOp::In,
        };
        placed.push((idx, PushdownPredicate { op, column, value }));
    }

    Ok(placed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::parse_turtle;
    use crate::mapping::MappingSet;

    fn mappings() -> MappingSet {
        parse_turtle(
            r##"
            @prefix rr: <http://www.w3.org/ns/r2rml#> .
            @prefix ex: <http://example.com/ns#> .
            @prefix xsd: <http://www.w3.org/2001/XMLSchema#> .

            <#CustomerMap>
                rr:logicalTable [ rr:tableName "customer" ] ;
                rr:subjectMap [ rr:template "http://ex/c/{id}" ] ;
                rr:predicateObjectMap [
                    rr:predicate ex:age ;
                    rr:objectMap [ rr:column "age" ; rr:datatype xsd:integer ]
                ] ;
                rr:predicateObjectMap [
                    rr:predicate ex:country ;
                    rr:objectMap [ rr:column "country" ; rr:datatype xsd:string ]
                ] ;
                rr:predicateObjectMap [
                    rr:predicate ex:orders ;
                    rr:objectMap [
                        rr:parentTriplesMap <#CustomerMap> ;
                        rr:joinCondition [ rr:child "id" ; rr:parent "id" ]
                    ]
                ] .
            "##,
        )
        .unwrap()
    }

    fn patterns() -> Vec<TriplePattern> {
        vec![
            TriplePattern::new(
                Term::var("s"),
                "http://example.com/ns#age",
                Term::var("age"),
            ),
            TriplePattern::new(
                Term::var("s"),
                "http://example.com/ns#country",
                Term::var("c"),
            ),
        ]
    }

    fn eq_filter(var: &str, value: Value) -> FilterExpr {
        FilterExpr::Compare {
            op: CompareOp::Eq,
            lhs: FilterOperand::Variable(var.to_string()),
            rhs: FilterOperand::Literal(value),
        }
    }

    #[test]
    fn test_integer_filter_pushes_down_coerced() {
        let set = mappings();
        let mapping = set.get("customer").unwrap();
        let analyzed =
            annotate(&patterns(), &[eq_filter("age", Value::from("123"))], &[], mapping, None);

        assert!(analyzed.residual.is_empty());
        let pushed = analyzed.pushdown();
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].op, PushdownOp::Eq);
        assert_eq!(pushed[0].column, "age");
        assert_eq!(pushed[0].value, PredicateValue::Scalar(Value::Int(123)));
        // Attached to the first pattern binding ?age
        assert_eq!(analyzed.by_pattern[0].len(), 1);
        assert!(analyzed.by_pattern[1].is_empty());
    }

    #[test]
    fn test_coercion_failure_demotes_to_residual() {
        let set = mappings();
        let mapping = set.get("customer").unwrap();
        let filter = eq_filter("age", Value::from("abc"));
        let analyzed = annotate(&patterns(), &[filter.clone()], &[], mapping, None);

        assert!(analyzed.pushdown().is_empty());
        assert_eq!(analyzed.residual, vec![filter]);
    }

    #[test]
    fn test_flipped_comparison() {
        let set = mappings();
        let mapping = set.get("customer").unwrap();
        let filter = FilterExpr::Compare {
            op: CompareOp::Lt,
            lhs: FilterOperand::Literal(Value::Int(18)),
            rhs: FilterOperand::Variable("age".to_string()),
        };
        let analyzed = annotate(&patterns(), &[filter], &[], mapping, None);
        let pushed = analyzed.pushdown();
        assert_eq!(pushed[0].op, PushdownOp::Gt, "(< 18 ?age) must become age > 18");
    }

    #[test]
    fn test_or_of_equalities_becomes_in_with_no_residual() {
        let set = mappings();
        let mapping = set.get("customer").unwrap();
        let filter = FilterExpr::Or(vec![
            eq_filter("c", Value::from("US")),
            eq_filter("c", Value::from("Canada")),
        ]);
        let analyzed = annotate(&patterns(), &[filter], &[], mapping, None);

        assert!(analyzed.residual.is_empty(), "no residual must remain");
        let pushed = analyzed.pushdown();
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].op, PushdownOp::In);
        assert_eq!(pushed[0].column, "country");
        assert_eq!(
            pushed[0].value,
            PredicateValue::List(vec![Value::from("US"), Value::from("Canada")])
        );
    }

    #[test]
    fn test_or_across_different_variables_is_residual() {
        let set = mappings();
        let mapping = set.get("customer").unwrap();
        let filter = FilterExpr::Or(vec![
            eq_filter("c", Value::from("US")),
            eq_filter("age", Value::from("30")),
        ]);
        let analyzed = annotate(&patterns(), &[filter], &[], mapping, None);
        assert_eq!(analyzed.residual.len(), 1);
        assert!(analyzed.pushdown().is_empty());
    }

    #[test]
    fn test_two_variable_comparison_is_residual() {
        let set = mappings();
        let mapping = set.get("customer").unwrap();
        let filter = FilterExpr::Compare {
            op: CompareOp::Eq,
            lhs: FilterOperand::Variable("age".to_string()),
            rhs: FilterOperand::Variable("c".to_string()),
        };
        let analyzed = annotate(&patterns(), &[filter], &[], mapping, None);
        assert_eq!(analyzed.residual.len(), 1);
    }

    #[test]
    fn test_unbound_variable_is_residual() {
        let set = mappings();
        let mapping = set.get("customer").unwrap();
        // ?bindOnly is introduced by BIND, not by any triple pattern.
        let filter = eq_filter("bindOnly", Value::Int(1));
        let analyzed = annotate(&patterns(), &[filter], &[], mapping, None);
        assert_eq!(analyzed.residual.len(), 1);
    }

    #[test]
    fn test_ref_predicate_has_no_backing_column() {
        let set = mappings();
        let mapping = set.get("customer").unwrap();
        let ref_patterns = vec![TriplePattern::new(
            Term::var("s"),
            "http://example.com/ns#orders",
            Term::var("o"),
        )];
        let analyzed =
            annotate(&ref_patterns, &[eq_filter("o", Value::Int(1))], &[], mapping, None);
        assert_eq!(analyzed.residual.len(), 1);
    }

    #[test]
    fn test_values_clause_becomes_in() {
        let set = mappings();
        let mapping = set.get("customer").unwrap();
        let values = ValuesClause {
            var: "c".to_string(),
            values: vec![Value::from("US"), Value::from("MX")],
        };
        let analyzed = annotate(&patterns(), &[], &[values], mapping, None);
        let pushed = analyzed.pushdown();
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].op, PushdownOp::In);
        assert_eq!(pushed[0].column, "country");
    }

    #[test]
    fn test_bound_and_is_null() {
        let set = mappings();
        let mapping = set.get("customer").unwrap();
        let analyzed = annotate(
            &patterns(),
            &[FilterExpr::Bound("age".to_string()), FilterExpr::IsNull("c".to_string())],
            &[],
            mapping,
            None,
        );
        let pushed = analyzed.pushdown();
        assert_eq!(pushed.len(), 2);
        assert!(pushed.iter().any(|p| p.op == PushdownOp::NotNull && p.column == "age"));
        assert!(pushed.iter().any(|p| p.op == PushdownOp::IsNull && p.column == "country"));
    }

    #[test]
    fn test_native_type_fallback_when_no_datatype() {
        let set = parse_turtle(
            r##"
            @prefix rr: <http://www.w3.org/ns/r2rml#> .
            @prefix ex: <http://example.com/ns#> .
            <#M>
                rr:logicalTable [ rr:tableName "t" ] ;
                rr:subjectMap [ rr:template "http://ex/{id}" ] ;
                rr:predicateObjectMap [
                    rr:predicate ex:n ;
                    rr:objectMap [ rr:column "n" ]
                ] .
            "##,
        )
        .unwrap();
        let mapping = set.get("t").unwrap();
        let pattern =
            vec![TriplePattern::new(Term::var("s"), "http://example.com/ns#n", Term::var("n"))];
        let mut native = HashMap::new();
        native.insert("n".to_string(), ColumnType::Int);

        let analyzed =
            annotate(&pattern, &[eq_filter("n", Value::from("7"))], &[], mapping, Some(&native));
        let pushed = analyzed.pushdown();
        assert_eq!(pushed[0].value, PredicateValue::Scalar(Value::Int(7)));
    }
}
