//! Pushdown Analyzer Integration Tests
//!
//! Tests for:
//! - Coercion soundness (Property 6)
//! - IN coalescing (Property 7)
//! - The two-equality-filters-become-IN scenario

use flureedb::pushdown::analyze::{annotate, CompareOp, FilterExpr, FilterOperand, Term, TriplePattern};
use flureedb::pushdown::{coalesce, PredicateValue, PushdownOp, PushdownPredicate};
use flureedb::{parse_turtle, MappingSet, Value};

// ============================================================================
// Test Helpers
// ============================================================================

fn mappings() -> MappingSet {
    parse_turtle(
        r##"
        @prefix rr: <http://www.w3.org/ns/r2rml#> .
        @prefix ex: <http://example.com/ns#> .
        @prefix xsd: <http://www.w3.org/2001/XMLSchema#> .

        <#PersonMap>
            rr:logicalTable [ rr:tableName "person" ] ;
            rr:subjectMap [ rr:template "http://ex/p/{id}" ] ;
            rr:predicateObjectMap [
                rr:predicate ex:age ;
                rr:objectMap [ rr:column "age" ; rr:datatype xsd:integer ]
            ] ;
            rr:predicateObjectMap [
                rr:predicate ex:country ;
                rr:objectMap [ rr:column "country" ; rr:datatype xsd:string ]
            ] .
        "##,
    )
    .unwrap()
}

fn patterns() -> Vec<TriplePattern> {
    vec![
        TriplePattern::new(Term::var("s"), "http://example.com/ns#age", Term::var("x")),
        TriplePattern::new(Term::var("s"), "http://example.com/ns#country", Term::var("c")),
    ]
}

fn eq(var: &str, value: Value) -> FilterExpr {
    FilterExpr::Compare {
        op: CompareOp::Eq,
        lhs: FilterOperand::Variable(var.to_string()),
        rhs: FilterOperand::Literal(value),
    }
}

// ============================================================================
// Coercion Soundness (Property 6)
// ============================================================================

#[test]
fn test_integer_column_gets_integer_pushdown() {
    let set = mappings();
    let mapping = set.get("person").unwrap();

    let analyzed = annotate(&patterns(), &[eq("x", Value::Int(123))], &[], mapping, None);
    let pushed = analyzed.pushdown();
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0].op, PushdownOp::Eq);
    assert_eq!(pushed[0].column, "age");
    assert_eq!(pushed[0].value, PredicateValue::Scalar(Value::Int(123)));
    assert!(analyzed.residual.is_empty());
}

#[test]
fn test_uncoercible_value_emits_no_pushdown_and_stays_residual() {
    let set = mappings();
    let mapping = set.get("person").unwrap();

    let filter = eq("x", Value::from("abc"));
    let analyzed = annotate(&patterns(), &[filter.clone()], &[], mapping, None);
    assert!(analyzed.pushdown().is_empty());
    assert_eq!(analyzed.residual, vec![filter]);
}

// ============================================================================
// IN Coalescing (Property 7)
// ============================================================================

#[test]
fn test_coalescer_merges_equalities_per_column() {
    let merged = coalesce(vec![
        PushdownPredicate::eq("C", Value::from("US")),
        PushdownPredicate::eq("C", Value::from("Canada")),
        PushdownPredicate::eq("D", Value::from("x")),
    ]);

    assert_eq!(merged.len(), 2);
    assert_eq!(merged[0].op, PushdownOp::In);
    assert_eq!(merged[0].column, "C");
    assert_eq!(
        merged[0].value,
        PredicateValue::List(vec![Value::from("US"), Value::from("Canada")])
    );
    assert_eq!(merged[1].op, PushdownOp::Eq);
    assert_eq!(merged[1].column, "D");
    assert_eq!(merged[1].value, PredicateValue::Scalar(Value::from("x")));
}

// ============================================================================
// Two Equality Filters Become IN (end-to-end scenario)
// ============================================================================

#[test]
fn test_disjunction_of_country_equalities_pushes_as_in_with_no_residual() {
    let set = mappings();
    let mapping = set.get("person").unwrap();

    // FILTER(?c = "US" || ?c = "Canada")
    let filter = FilterExpr::Or(vec![
        eq("c", Value::from("US")),
        eq("c", Value::from("Canada")),
    ]);
    let analyzed = annotate(&patterns(), &[filter], &[], mapping, None);

    assert!(analyzed.residual.is_empty(), "no residual filter may remain");
    let pushed = analyzed.pushdown();
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0].op, PushdownOp::In);
    assert_eq!(pushed[0].column, "country");
    assert_eq!(
        pushed[0].value,
        PredicateValue::List(vec![Value::from("US"), Value::from("Canada")])
    );
}
