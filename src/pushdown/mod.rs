//! Predicate Pushdown
//!
//! Recognizes the SPARQL filter forms and VALUES clauses a tabular source
//! can evaluate during scan, coerces literal values to column types, and
//! coalesces equality sets into IN-predicates. Anything not pushable stays
//! behind as a residual filter.

pub mod analyze;
pub mod coerce;

pub use analyze::{
    AnalyzedGroup, CompareOp, FilterExpr, FilterOperand, Term, TriplePattern, ValuesClause,
};
pub use coerce::{coerce_literal, CoercionTarget};

use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Operators a tabular source can evaluate during scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PushdownOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    IsNull,
    NotNull,
}

/// Value slot of a pushdown predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredicateValue {
    /// Unary predicates (is-null / not-null) carry no value
    None,
    Scalar(Value),
    List(Vec<Value>),
}

/// One predicate the scan hands to the underlying table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushdownPredicate {
    pub op: PushdownOp,
    pub column: String,
    pub value: PredicateValue,
}

impl PushdownPredicate {
    pub fn eq(column: impl Into<String>, value: Value) -> Self {
        PushdownPredicate {
            op: PushdownOp::Eq,
            column: column.into(),
            value: PredicateValue::Scalar(value),
        }
    }

    pub fn in_list(column: impl Into<String>, values: Vec<Value>) -> Self {
        PushdownPredicate {
            op: PushdownOp::In,
            column: column.into(),
            value: PredicateValue::List(values),
        }
    }

    /// Evaluate against one row value. Used by sources that apply pushdown
    /// predicates file-side and by the residual filter operator.
    pub fn matches(&self, value: &Value) -> bool {
        match self.op {
            PushdownOp::IsNull => value.is_null(),
            PushdownOp::NotNull => !value.is_null(),
            PushdownOp::In => match &self.value {
                PredicateValue::List(list) => list.iter().any(|v| v == value),
                _ => false,
            },
            PushdownOp::Eq => match &self.value {
                PredicateValue::Scalar(v) => {
                    value.compare(v) == Some(std::cmp::Ordering::Equal)
                }
                _ => false,
            },
            PushdownOp::Ne => match &self.value {
                PredicateValue::Scalar(v) => {
                    matches!(
                        value.compare(v),
                        Some(std::cmp::Ordering::Less) | Some(std::cmp::Ordering::Greater)
                    )
                }
                _ => false,
            },
            PushdownOp::Lt | PushdownOp::Lte | PushdownOp::Gt | PushdownOp::Gte => {
                let PredicateValue::Scalar(v) = &self.value else {
                    return false;
                };
                match value.compare(v) {
                    Some(ord) => match self.op {
                        PushdownOp::Lt => ord == std::cmp::Ordering::Less,
                        PushdownOp::Lte => ord != std::cmp::Ordering::Greater,
                        PushdownOp::Gt => ord == std::cmp::Ordering::Greater,
                        PushdownOp::Gte => ord != std::cmp::Ordering::Less,
                        _ => unreachable!(),
                    },
                    None => false,
                }
            }
        }
    }
}

/// Merge equality predicates per column: several `eq` on one column become
/// one `in`, and an existing `in` absorbs further `eq` values. Everything
/// else passes through in order.
pub fn coalesce(predicates: Vec<PushdownPredicate>) -> Vec<PushdownPredicate> {
    let mut out: Vec<PushdownPredicate> = Vec::with_capacity(predicates.len());

    for pred in predicates {
        let mergeable = matches!(pred.op, PushdownOp::Eq | PushdownOp::In);
        if !mergeable {
            out.push(pred);
            continue;
        }
        let existing = out.iter_mut().find(|p| {
            p.column == pred.column && matches!(p.op, PushdownOp::Eq | PushdownOp::In)
        });
        match existing {
            None => out.push(pred),
            Some(slot) => {
                let mut values = match std::mem::replace(&mut slot.value, PredicateValue::None) {
                    PredicateValue::Scalar(v) => vec![v],
                    PredicateValue::List(vs) => vs,
                    PredicateValue::None => Vec::new(),
                };
                match pred.value {
                    PredicateValue::Scalar(v) => {
                        if !values.contains(&v) {
                            values.push(v);
                        }
                    }
                    PredicateValue::List(vs) => {
                        for v in vs {
                            if !values.contains(&v) {
                                values.push(v);
                            }
                        }
                    }
                    PredicateValue::None => {}
                }
                slot.op = PushdownOp::In;
                slot.value = PredicateValue::List(values);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coalesce_merges_eq_into_in() {
        let merged = coalesce(vec![
            PushdownPredicate::eq("country", Value::from("US")),
            PushdownPredicate::eq("country", Value::from("Canada")),
            PushdownPredicate::eq("region", Value::from("x")),
        ]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].op, PushdownOp::In);
        assert_eq!(merged[0].column, "country");
        assert_eq!(
            merged[0].value,
            PredicateValue::List(vec![Value::from("US"), Value::from("Canada")])
        );
        assert_eq!(merged[1].op, PushdownOp::Eq);
        assert_eq!(merged[1].column, "region");
    }

    #[test]
    fn test_existing_in_absorbs_eq() {
        let merged = coalesce(vec![
            PushdownPredicate::in_list("c", vec![Value::Int(1), Value::Int(2)]),
            PushdownPredicate::eq("c", Value::Int(3)),
            PushdownPredicate::eq("c", Value::Int(2)),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(
            merged[0].value,
            PredicateValue::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
    }

    #[test]
    fn test_single_eq_stays_eq() {
        let merged = coalesce(vec![PushdownPredicate::eq("c", Value::Int(1))]);
        assert_eq!(merged[0].op, PushdownOp::Eq);
    }

    #[test]
    fn test_range_ops_do_not_merge() {
        let merged = coalesce(vec![
            PushdownPredicate {
                op: PushdownOp::Gte,
                column: "c".to_string(),
                value: PredicateValue::Scalar(Value::Int(1)),
            },
            PushdownPredicate {
                op: PushdownOp::Lt,
                column: "c".to_string(),
                value: PredicateValue::Scalar(Value::Int(10)),
            },
        ]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_predicate_matches() {
        let pred = PushdownPredicate::in_list("c", vec![Value::from("US"), Value::from("CA")]);
        assert!(pred.matches(&Value::from("US")));
        assert!(!pred.matches(&Value::from("MX")));

        let gt = PushdownPredicate {
            op: PushdownOp::Gt,
            column: "n".to_string(),
            value: PredicateValue::Scalar(Value::Int(5)),
        };
        assert!(gt.matches(&Value::Int(6)));
        assert!(!gt.matches(&Value::Int(5)));
        assert!(!gt.matches(&Value::Null));
    }
}
