//! Records, where-conditions and loose scalar helpers.
//!
//! Field values are `serde_json::Value`s. A [`Record`] is the ordered field→value
//! container a model works on; a [`Where`] is the ordered field→[`Condition`] map that
//! resolved query options carry to the database engine.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub use serde_json::Value;

/// Reserved where-key holding a raw SQL condition string
pub const RAW_CONDITION_KEY: &str = "_string";

/// Operator tag of an update expression value
pub const EXPRESSION_TAG: &str = "exp";

/// One row's candidate or loaded data
///
/// Keeps insertion order. `has` follows "is set" semantics: the field must be present
/// and not null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: IndexMap<String, Value>,
}

impl Record {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from a JSON object; any other value yields `None`
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(map.into_iter().collect()),
            _ => None,
        }
    }

    /// Serialize any serde type and accept it if it is object-shaped
    pub fn from_serialize<T: Serialize + ?Sized>(data: &T) -> Option<Self> {
        serde_json::to_value(data).ok().and_then(Self::from_value)
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Value of `field`, `Value::Null` when absent
    #[must_use]
    pub fn value(&self, field: &str) -> &Value {
        self.fields.get(field).unwrap_or(&Value::Null)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(field.into(), value.into())
    }

    /// Present and not null
    #[must_use]
    pub fn has(&self, field: &str) -> bool {
        self.fields.get(field).is_some_and(|v| !v.is_null())
    }

    #[must_use]
    pub fn contains_key(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.shift_remove(field)
    }

    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str, &mut Value) -> bool,
    {
        self.fields.retain(|k, v| keep(k, v));
    }

    pub fn get_mut(&mut self, field: &str) -> Option<&mut Value> {
        self.fields.get_mut(field)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.fields.values()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, Value> {
        self.fields.iter()
    }

    pub fn iter_mut(&mut self) -> indexmap::map::IterMut<'_, String, Value> {
        self.fields.iter_mut()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }

    /// Subset of this record restricted to `fields`, missing ones as null
    #[must_use]
    pub fn pick(&self, fields: &[String]) -> Record {
        fields
            .iter()
            .map(|f| (f.clone(), self.value(f).clone()))
            .collect()
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.fields.into_iter().collect())
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = (&'a String, &'a Value);
    type IntoIter = indexmap::map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        record.into_value()
    }
}

/// Update expression value, e.g. `expression("score+1")`
#[must_use]
pub fn expression(sql: impl Into<String>) -> Value {
    Value::Array(vec![Value::from(EXPRESSION_TAG), Value::from(sql.into())])
}

/// SQL text of an update expression value
#[must_use]
pub fn as_expression(value: &Value) -> Option<&str> {
    match value.as_array().map(Vec::as_slice) {
        Some([Value::String(tag), Value::String(sql)]) if tag == EXPRESSION_TAG => Some(sql),
        _ => None,
    }
}

/// A single where-entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    /// Equality against a value
    Eq(Value),
    /// `[operator, operand]` form: `IN`, `neq`, `between`, `exp`, ...
    Op { op: String, operand: Value },
}

impl Condition {
    pub fn op(op: impl Into<String>, operand: impl Into<Value>) -> Self {
        Condition::Op {
            op: op.into(),
            operand: operand.into(),
        }
    }

    /// Equality against a bool, number or string
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        matches!(self, Condition::Eq(v) if is_scalar(v))
    }

    /// Interpret a JSON value: a two-element array led by a string is `[op, operand]`
    #[must_use]
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Array(mut items) if items.len() == 2 && items[0].is_string() => {
                let operand = items.pop().unwrap_or(Value::Null);
                let op = items.pop().and_then(|v| v.as_str().map(str::to_string));
                match op {
                    Some(op) => Condition::Op { op, operand },
                    None => Condition::Eq(Value::Array(vec![Value::Null, operand])),
                }
            }
            other => Condition::Eq(other),
        }
    }
}

macro_rules! condition_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Condition {
                fn from(value: $ty) -> Self {
                    Condition::Eq(Value::from(value))
                }
            }
        )*
    };
}

condition_from!(&str, String, i32, i64, u32, u64, f64, bool);

impl From<Value> for Condition {
    fn from(value: Value) -> Self {
        Condition::Eq(value)
    }
}

/// Ordered where-mapping; repeated keys overwrite in place
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Where {
    entries: IndexMap<String, Condition>,
}

impl Where {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Equality on `field`
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, Condition::Eq(value.into()));
        self
    }

    /// `[op, operand]` on `field`
    #[must_use]
    pub fn op(
        mut self,
        field: impl Into<String>,
        op: impl Into<String>,
        operand: impl Into<Value>,
    ) -> Self {
        self.insert(field, Condition::op(op, operand));
        self
    }

    /// Raw SQL condition under the reserved key
    #[must_use]
    pub fn raw(mut self, sql: impl Into<String>) -> Self {
        self.insert(RAW_CONDITION_KEY, Condition::Eq(Value::from(sql.into())));
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, condition: impl Into<Condition>) {
        self.entries.insert(key.into(), condition.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Condition> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Condition> {
        self.entries.get_mut(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Condition> {
        self.entries.shift_remove(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Merge `other` key-wise; colliding keys take `other`'s condition
    pub fn merge(&mut self, other: Where) {
        for (key, condition) in other.entries {
            self.entries.insert(key, condition);
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, Condition> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, Condition)> for Where {
    fn from_iter<I: IntoIterator<Item = (String, Condition)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Where {
    type Item = (String, Condition);
    type IntoIter = indexmap::map::IntoIter<String, Condition>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl From<Record> for Where {
    fn from(record: Record) -> Self {
        record
            .into_iter()
            .map(|(k, v)| (k, Condition::from_json(v)))
            .collect()
    }
}

/// Bool, number or string
#[must_use]
pub fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::Bool(_) | Value::Number(_) | Value::String(_))
}

/// "Empty" the way form input is judged: null, false, 0, "", "0", empty array/object
#[must_use]
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty() || s == "0",
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Text form of a value: null and false are "", true is "1"
#[must_use]
pub fn to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => String::new(),
        Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => i.to_string(),
            (None, Some(u), _) => u.to_string(),
            (None, None, Some(f)) if f.fract() == 0.0 && f.abs() < 1e15 => {
                format!("{}", f as i64)
            }
            _ => n.to_string(),
        },
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Numeric view of numbers, booleans and numeric strings
#[must_use]
pub fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

/// Loose comparison: numerically when both sides are numeric, textually otherwise
#[must_use]
pub fn loose_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (to_number(a), to_number(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y),
        _ => Some(to_text(a).cmp(&to_text(b))),
    }
}

#[must_use]
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    loose_cmp(a, b) == Some(Ordering::Equal)
}
