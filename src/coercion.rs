//! Type coercion of scalar values against declared SQL column types.
//!
//! Values entering a record or a where-condition are normalized according to the
//! column's declared type: integers for `int` columns (except `bigint`), floats for
//! `float`/`double`, booleans for `bool`. Enum columns and everything else pass through.

use crate::value::{is_scalar, Value};
use once_cell::sync::Lazy;
use regex::Regex;

static LEADING_INT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[+-]?\d+").expect("valid integer prefix pattern"));

static LEADING_FLOAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?")
        .expect("valid float prefix pattern")
});

/// Coercion target derived from a declared column type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    Integer,
    Float,
    Boolean,
    Passthrough,
}

impl Coercion {
    /// Classify a declared type such as `int(11) unsigned` or `enum('a','b')`
    #[must_use]
    pub fn for_type(field_type: &str) -> Self {
        let ty = field_type.to_ascii_lowercase();
        if ty.contains("enum") {
            Coercion::Passthrough
        } else if !ty.contains("bigint") && ty.contains("int") {
            Coercion::Integer
        } else if ty.contains("float") || ty.contains("double") {
            Coercion::Float
        } else if ty.contains("bool") {
            Coercion::Boolean
        } else {
            Coercion::Passthrough
        }
    }
}

/// Normalize `value` for a column declared as `field_type`
///
/// Non-scalar values (null, arrays, objects) are returned unchanged.
#[must_use]
pub fn coerce(field_type: &str, value: &Value) -> Value {
    if !is_scalar(value) {
        return value.clone();
    }
    match Coercion::for_type(field_type) {
        Coercion::Integer => Value::from(int_value(value)),
        Coercion::Float => float_value(value)
            .and_then(|f| serde_json::Number::from_f64(f).map(Value::Number))
            .unwrap_or_else(|| Value::from(0)),
        Coercion::Boolean => Value::Bool(bool_value(value)),
        Coercion::Passthrough => value.clone(),
    }
}

/// Integer view: leading digits of strings, truncated floats, booleans as 0/1
#[must_use]
pub fn int_value(value: &Value) -> i64 {
    match value {
        Value::Bool(b) => i64::from(*b),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().map(|u| i64::try_from(u).unwrap_or(i64::MAX)))
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => parse_int_prefix(s),
        _ => 0,
    }
}

/// Leading integer of a string, 0 when there is none
#[must_use]
pub fn parse_int_prefix(text: &str) -> i64 {
    if let Some(m) = LEADING_FLOAT.find(text) {
        // "1e3" and "3.9" read through the float prefix, then truncate
        let prefix = m.as_str().trim();
        if prefix.contains(['e', 'E', '.']) {
            return prefix.parse::<f64>().map(|f| f as i64).unwrap_or(0);
        }
    }
    LEADING_INT
        .find(text)
        .and_then(|m| m.as_str().trim().parse::<i64>().ok())
        .unwrap_or(0)
}

fn float_value(value: &Value) -> Option<f64> {
    match value {
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => Some(
            LEADING_FLOAT
                .find(s)
                .and_then(|m| m.as_str().trim().parse::<f64>().ok())
                .unwrap_or(0.0),
        ),
        _ => None,
    }
}

fn bool_value(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !(s.is_empty() || s == "0"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classification() {
        assert_eq!(Coercion::for_type("int(11) unsigned"), Coercion::Integer);
        assert_eq!(Coercion::for_type("TINYINT(1)"), Coercion::Integer);
        assert_eq!(Coercion::for_type("bigint(20)"), Coercion::Passthrough);
        assert_eq!(Coercion::for_type("double(8,2)"), Coercion::Float);
        assert_eq!(Coercion::for_type("float"), Coercion::Float);
        assert_eq!(Coercion::for_type("boolean"), Coercion::Boolean);
        assert_eq!(Coercion::for_type("enum('1','2')"), Coercion::Passthrough);
        assert_eq!(Coercion::for_type("varchar(32)"), Coercion::Passthrough);
    }

    #[test]
    fn test_integer_coercion() {
        assert_eq!(coerce("int", &json!("7")), json!(7));
        assert_eq!(coerce("int", &json!("12abc")), json!(12));
        assert_eq!(coerce("int", &json!("abc")), json!(0));
        assert_eq!(coerce("int", &json!("3.9")), json!(3));
        assert_eq!(coerce("int", &json!(-2.7)), json!(-2));
        assert_eq!(coerce("int", &json!(true)), json!(1));
    }

    #[test]
    fn test_enum_values_preserved() {
        // enum('1','2') contains "int"-free text but must never be touched
        assert_eq!(coerce("enum('10','20')", &json!("10")), json!("10"));
        assert_eq!(coerce("enum('point','int')", &json!("point")), json!("point"));
    }

    #[test]
    fn test_float_and_bool_coercion() {
        assert_eq!(coerce("double", &json!("2.5kg")), json!(2.5));
        assert_eq!(coerce("float", &json!(3)), json!(3.0));
        assert_eq!(coerce("bool", &json!("0")), json!(false));
        assert_eq!(coerce("bool", &json!("no")), json!(true));
        assert_eq!(coerce("bool", &json!(0)), json!(false));
    }

    #[test]
    fn test_non_scalars_untouched() {
        assert_eq!(coerce("int", &json!(null)), json!(null));
        assert_eq!(coerce("int", &json!(["exp", "a+1"])), json!(["exp", "a+1"]));
    }

    #[test]
    fn test_coercion_is_idempotent() {
        for (ty, raw) in [
            ("int", json!("42x")),
            ("double", json!("1.5")),
            ("bool", json!("")),
            ("varchar(8)", json!("keep")),
            ("bigint", json!("9007199254740993")),
        ] {
            let once = coerce(ty, &raw);
            assert_eq!(coerce(ty, &once), once, "type {ty}");
        }
    }
}
