//! Primary key descriptors and lookup-argument resolution.
//!
//! `find`, `select` and `delete` accept a [`Lookup`]: nothing, a key value, a list of
//! composite key values or explicit options. This module turns a lookup into option
//! overrides against the model's [`PrimaryKey`], and derives `save`'s where-clause from
//! the key fields present in the data.

use crate::error::{ModelError, ModelResult};
use crate::query::QueryOptions;
use crate::value::{Condition, Record, Value, Where};
use serde::{Deserialize, Serialize};

/// Primary key of a table: one field or an ordered list of fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKey {
    Single(String),
    Composite(Vec<String>),
}

impl Default for PrimaryKey {
    fn default() -> Self {
        PrimaryKey::Single("id".to_string())
    }
}

impl PrimaryKey {
    /// Build from collected key fields; one field is a single key
    #[must_use]
    pub fn from_fields(mut fields: Vec<String>) -> Option<Self> {
        match fields.len() {
            0 => None,
            1 => fields.pop().map(PrimaryKey::Single),
            _ => Some(PrimaryKey::Composite(fields)),
        }
    }

    /// Key field names in order
    #[must_use]
    pub fn fields(&self) -> Vec<&str> {
        match self {
            PrimaryKey::Single(field) => vec![field.as_str()],
            PrimaryKey::Composite(fields) => fields.iter().map(String::as_str).collect(),
        }
    }

    /// Field name of a single key
    #[must_use]
    pub fn as_single(&self) -> Option<&str> {
        match self {
            PrimaryKey::Single(field) => Some(field),
            PrimaryKey::Composite(_) => None,
        }
    }

    #[must_use]
    pub fn is_composite(&self) -> bool {
        matches!(self, PrimaryKey::Composite(_))
    }

    #[must_use]
    pub fn arity(&self) -> usize {
        match self {
            PrimaryKey::Single(_) => 1,
            PrimaryKey::Composite(fields) => fields.len(),
        }
    }
}

/// Lookup argument of `find`, `select` and `delete`
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Lookup {
    /// Use the pending chain state only
    #[default]
    Pending,
    /// Key value; a comma list string means `IN` for a single key
    Key(Value),
    /// Positional values for a composite key
    Composite(Vec<Value>),
    /// Explicit option overrides
    Options(QueryOptions),
    /// Return the generated SQL instead of executing
    FetchSql,
}

macro_rules! lookup_from_key {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Lookup {
                fn from(value: $ty) -> Self {
                    Lookup::Key(Value::from(value))
                }
            }
        )*
    };
}

lookup_from_key!(&str, String, i32, i64, u32, u64);

impl From<Value> for Lookup {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Lookup::Pending,
            Value::Array(items) => Lookup::Composite(items),
            other => Lookup::Key(other),
        }
    }
}

impl From<Vec<Value>> for Lookup {
    fn from(values: Vec<Value>) -> Self {
        Lookup::Composite(values)
    }
}

impl From<QueryOptions> for Lookup {
    fn from(options: QueryOptions) -> Self {
        Lookup::Options(options)
    }
}

impl From<Where> for Lookup {
    fn from(conditions: Where) -> Self {
        Lookup::Options(QueryOptions::with_conditions(conditions))
    }
}

/// Turn a lookup into option overrides for `pk`
///
/// # Errors
///
/// Returns `ModelError::IncompleteCompositeKey` when the number of positional values
/// does not match the key's arity.
pub fn resolve_lookup(pk: &PrimaryKey, lookup: Lookup) -> ModelResult<QueryOptions> {
    match lookup {
        Lookup::Pending => Ok(QueryOptions::default()),
        Lookup::FetchSql => Ok(QueryOptions {
            fetch_sql: true,
            ..QueryOptions::default()
        }),
        Lookup::Options(options) => Ok(options),
        Lookup::Key(value) => key_condition(pk, value).map(QueryOptions::with_conditions),
        Lookup::Composite(values) => {
            positional_condition(pk, values).map(QueryOptions::with_conditions)
        }
    }
}

fn key_condition(pk: &PrimaryKey, value: Value) -> ModelResult<Where> {
    match pk {
        PrimaryKey::Single(field) => {
            let condition = match &value {
                Value::String(s) if s.find(',').is_some_and(|pos| pos > 0) => {
                    Condition::op("IN", value)
                }
                _ => Condition::Eq(value),
            };
            let mut conditions = Where::new();
            conditions.insert(field.clone(), condition);
            Ok(conditions)
        }
        PrimaryKey::Composite(_) => positional_condition(pk, vec![value]),
    }
}

fn positional_condition(pk: &PrimaryKey, mut values: Vec<Value>) -> ModelResult<Where> {
    match pk {
        PrimaryKey::Single(_) if values.len() == 1 => {
            let value = values.pop().unwrap_or(Value::Null);
            key_condition(pk, value)
        }
        PrimaryKey::Single(_) => Err(ModelError::IncompleteCompositeKey {
            expected: 1,
            given: values.len(),
        }),
        PrimaryKey::Composite(fields) => {
            if fields.len() != values.len() {
                return Err(ModelError::IncompleteCompositeKey {
                    expected: fields.len(),
                    given: values.len(),
                });
            }
            Ok(fields
                .iter()
                .cloned()
                .zip(values)
                .map(|(field, value)| (field, Condition::Eq(value)))
                .collect())
        }
    }
}

/// Move the key fields out of `data` into a where-mapping for an update
///
/// # Errors
///
/// A single key that is absent yields `ModelError::MissingCondition`; a composite key
/// with any field absent yields `ModelError::IncompleteCompositeKey` and leaves `data`
/// untouched.
pub fn take_update_condition(pk: &PrimaryKey, data: &mut Record) -> ModelResult<Where> {
    let fields = pk.fields();
    let present = fields.iter().filter(|f| data.has(f)).count();
    if present == 0 && !pk.is_composite() {
        return Err(ModelError::MissingCondition);
    }
    if present != fields.len() {
        return Err(ModelError::IncompleteCompositeKey {
            expected: fields.len(),
            given: present,
        });
    }

    let mut conditions = Where::new();
    for field in fields {
        if let Some(value) = data.remove(field) {
            conditions.insert(field, Condition::Eq(value));
        }
    }
    Ok(conditions)
}
