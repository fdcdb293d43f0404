//! Value Coercion
//!
//! A literal is coerced against the XSD datatype declared in the mapping
//! or, failing that, against the column's native type. A failed coercion is
//! an observable `Coercion` error, never a silent nil: the caller demotes
//! the containing predicate to a residual filter and logs the refusal.
//!
//! Supported coercions: XSD integer family -> i64; decimal/double/float ->
//! f64; strict booleans (actual booleans or exactly `true`/`false`);
//! `xsd:dateTime`/`xsd:date` -> instants; strings pass through.

use crate::error::{Error, Result};
use crate::mapping::XSD_NS;
use crate::value::{ColumnType, Value};
use chrono::{DateTime, NaiveDate};

/// What a literal is coerced against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoercionTarget<'a> {
    /// An XSD datatype IRI from the mapping
    Datatype(&'a str),
    /// The column's native type from the backend schema
    Native(ColumnType),
}

/// Coerce one literal. `Err` carries kind `Coercion` and names the value
/// and target so refusals are diagnosable.
pub fn coerce_literal(value: &Value, target: CoercionTarget<'_>) -> Result<Value> {
    match target {
        CoercionTarget::Datatype(iri) => coerce_to_datatype(value, iri),
        CoercionTarget::Native(column_type) => coerce_to_native(value, column_type),
    }
}

fn coerce_to_datatype(value: &Value, datatype: &str) -> Result<Value> {
    let local = datatype.strip_prefix(XSD_NS).unwrap_or(datatype);
    match local {
        "integer" | "long" | "int" | "short" | "byte" | "nonNegativeInteger"
        | "positiveInteger" => to_int(value, datatype),
        "decimal" | "double" | "float" => to_float(value, datatype),
        "boolean" => to_bool(value, datatype),
        "dateTime" => to_timestamp(value, datatype),
        "date" => to_date(value, datatype),
        "string" => Ok(to_text(value)),
        _ => Err(refusal(value, datatype)),
    }
}

fn coerce_to_native(value: &Value, column_type: ColumnType) -> Result<Value> {
    match column_type {
        ColumnType::Int => to_int(value, "int column"),
        ColumnType::Float => to_float(value, "float column"),
        ColumnType::Bool => to_bool(value, "bool column"),
        ColumnType::String => Ok(to_text(value)),
        ColumnType::Timestamp => to_timestamp(value, "timestamp column"),
        ColumnType::Date => to_date(value, "date column"),
    }
}

fn refusal(value: &Value, target: &str) -> Error {
    Error::coercion(format!("cannot coerce '{value}' to {target}"))
}

fn to_int(value: &Value, target: &str) -> Result<Value> {
    match value {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Ok(Value::Int(*f as i64)),
        Value::Str(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| refusal(value, target)),
        _ => Err(refusal(value, target)),
    }
}

fn to_float(value: &Value, target: &str) -> Result<Value> {
    match value {
        Value::Float(f) => Ok(Value::Float(*f)),
        Value::Int(i) => Ok(Value::Float(*i as f64)),
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| refusal(value, target)),
        _ => Err(refusal(value, target)),
    }
}

// Strict: actual booleans, or exactly the two canonical strings.
fn to_bool(value: &Value, target: &str) -> Result<Value> {
    match value {
        Value::Bool(b) => Ok(Value::Bool(*b)),
        Value::Str(s) if s == "true" => Ok(Value::Bool(true)),
        Value::Str(s) if s == "false" => Ok(Value::Bool(false)),
        _ => Err(refusal(value, target)),
    }
}

fn to_timestamp(value: &Value, target: &str) -> Result<Value> {
    match value {
        Value::Timestamp(us) => Ok(Value::Timestamp(*us)),
        Value::Str(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|dt| Value::Timestamp(dt.timestamp_micros()))
            .map_err(|_| refusal(value, target)),
        _ => Err(refusal(value, target)),
    }
}

fn to_date(value: &Value, target: &str) -> Result<Value> {
    match value {
        Value::Date(days) => Ok(Value::Date(*days)),
        Value::Str(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(|date| {
                let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).expect("epoch is valid");
                Value::Date((date - epoch).num_days() as i32)
            })
            .map_err(|_| refusal(value, target)),
        _ => Err(refusal(value, target)),
    }
}

fn to_text(value: &Value) -> Value {
    match value {
        Value::Str(s) => Value::Str(s.clone()),
        other => Value::Str(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xsd(local: &str) -> String {
        format!("{XSD_NS}{local}")
    }

    #[test]
    fn test_integer_family() {
        for dt in ["integer", "long", "int", "short", "byte"] {
            let coerced = coerce_literal(&Value::from("123"), CoercionTarget::Datatype(&xsd(dt)));
            assert_eq!(coerced.unwrap(), Value::Int(123));
        }
        assert_eq!(
            coerce_literal(&Value::Int(7), CoercionTarget::Datatype(&xsd("integer"))).unwrap(),
            Value::Int(7)
        );
        assert_eq!(
            coerce_literal(&Value::Float(4.0), CoercionTarget::Datatype(&xsd("integer"))).unwrap(),
            Value::Int(4)
        );
    }

    #[test]
    fn test_integer_refusals_are_observable() {
        let err =
            coerce_literal(&Value::from("abc"), CoercionTarget::Datatype(&xsd("integer")))
                .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Coercion);
        assert!(err.message().contains("abc"));

        assert!(
            coerce_literal(&Value::Float(1.5), CoercionTarget::Datatype(&xsd("integer"))).is_err()
        );
    }

    #[test]
    fn test_float_family() {
        for dt in ["decimal", "double", "float"] {
            assert_eq!(
                coerce_literal(&Value::from("1.25"), CoercionTarget::Datatype(&xsd(dt))).unwrap(),
                Value::Float(1.25)
            );
        }
        assert_eq!(
            coerce_literal(&Value::Int(2), CoercionTarget::Datatype(&xsd("double"))).unwrap(),
            Value::Float(2.0)
        );
    }

    #[test]
    fn test_boolean_is_strict() {
        assert_eq!(
            coerce_literal(&Value::from("true"), CoercionTarget::Datatype(&xsd("boolean")))
                .unwrap(),
            Value::Bool(true)
        );
        assert!(
            coerce_literal(&Value::from("TRUE"), CoercionTarget::Datatype(&xsd("boolean")))
                .is_err()
        );
        assert!(
            coerce_literal(&Value::Int(1), CoercionTarget::Datatype(&xsd("boolean"))).is_err()
        );
    }

    #[test]
    fn test_datetime_and_date() {
        let ts = coerce_literal(
            &Value::from("2024-03-01T12:00:00Z"),
            CoercionTarget::Datatype(&xsd("dateTime")),
        )
        .unwrap();
        assert!(matches!(ts, Value::Timestamp(_)));

        let date =
            coerce_literal(&Value::from("1970-01-02"), CoercionTarget::Datatype(&xsd("date")))
                .unwrap();
        assert_eq!(date, Value::Date(1));

        assert!(coerce_literal(
            &Value::from("not-a-date"),
            CoercionTarget::Datatype(&xsd("date"))
        )
        .is_err());
    }

    #[test]
    fn test_strings_pass_through() {
        assert_eq!(
            coerce_literal(&Value::from("hi"), CoercionTarget::Datatype(&xsd("string"))).unwrap(),
            Value::from("hi")
        );
        assert_eq!(
            coerce_literal(&Value::Int(5), CoercionTarget::Native(ColumnType::String)).unwrap(),
            Value::from("5")
        );
    }

    #[test]
    fn test_native_column_fallback() {
        assert_eq!(
            coerce_literal(&Value::from("9"), CoercionTarget::Native(ColumnType::Int)).unwrap(),
            Value::Int(9)
        );
        assert!(coerce_literal(&Value::from("x"), CoercionTarget::Native(ColumnType::Int)).is_err());
    }

    #[test]
    fn test_unknown_datatype_is_refused() {
        assert!(coerce_literal(&Value::Int(1), CoercionTarget::Datatype("http://other/dt")).is_err());
    }
}
