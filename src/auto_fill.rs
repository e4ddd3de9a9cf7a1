//! Declarative auto-fill rules applied to a record before it is persisted.

use crate::callback::CallbackRegistry;
use crate::error::ModelResult;
use crate::validation::{Operation, Scope};
use crate::value::{Record, Value};
use std::fmt;
use std::sync::Arc;

/// Fill function: current value (when present) and extra arguments in, new value out
pub type FillFn = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;

/// How a rule produces its value
#[derive(Clone)]
pub enum Fill {
    /// Fixed value
    Constant(Value),
    /// Copy of another field (null when absent)
    Field(String),
    Function { func: FillFn, args: Vec<Value> },
    /// Named callback registered on the model
    Callback { name: String, args: Vec<Value> },
    /// Remove the field when its value is identical to this one
    Ignore(Value),
}

impl fmt::Debug for Fill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fill::Constant(v) => f.debug_tuple("Constant").field(v).finish(),
            Fill::Field(name) => f.debug_tuple("Field").field(name).finish(),
            Fill::Function { args, .. } => f.debug_struct("Function").field("args", args).finish(),
            Fill::Callback { name, args } => f
                .debug_struct("Callback")
                .field("name", name)
                .field("args", args)
                .finish(),
            Fill::Ignore(v) => f.debug_tuple("Ignore").field(v).finish(),
        }
    }
}

impl Fill {
    pub fn function<F>(func: F) -> Self
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        Fill::Function {
            func: Arc::new(func),
            args: Vec::new(),
        }
    }

    pub fn callback(name: impl Into<String>) -> Self {
        Fill::Callback {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Extra arguments for function and callback fills
    #[must_use]
    pub fn with_args(self, extra: Vec<Value>) -> Self {
        match self {
            Fill::Function { func, .. } => Fill::Function { func, args: extra },
            Fill::Callback { name, .. } => Fill::Callback { name, args: extra },
            other => other,
        }
    }
}

/// One auto-fill rule; applies on insert unless scoped otherwise
#[derive(Debug, Clone)]
pub struct AutoFillRule {
    pub field: String,
    pub fill: Fill,
    pub scope: Scope,
}

impl AutoFillRule {
    pub fn new(field: impl Into<String>, fill: Fill) -> Self {
        Self {
            field: field.into(),
            fill,
            scope: Scope::Insert,
        }
    }

    #[must_use]
    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }
}

/// Apply `rules` that match `operation` to `data`, in order
///
/// A rule producing exactly `false` removes its field.
///
/// # Errors
///
/// Returns `ModelError::UnknownMethod` for a callback rule naming an unregistered
/// callback.
pub fn apply(
    rules: &[AutoFillRule],
    data: &mut Record,
    operation: Operation,
    callbacks: &CallbackRegistry,
) -> ModelResult<()> {
    for rule in rules.iter().filter(|r| r.scope.applies_to(operation)) {
        let field = rule.field.as_str();
        match &rule.fill {
            Fill::Function { func, args } => {
                let value = func(&leading_current(data, field, args));
                data.set(field, value);
            }
            Fill::Callback { name, args } => {
                let value = callbacks.call(name, &leading_current(data, field, args))?;
                data.set(field, value);
            }
            Fill::Field(source) => {
                let value = data.value(source).clone();
                data.set(field, value);
            }
            Fill::Ignore(comparator) => {
                if data.get(field) == Some(comparator) {
                    data.remove(field);
                }
            }
            Fill::Constant(value) => {
                data.set(field, value.clone());
            }
        }
        if data.get(field) == Some(&Value::Bool(false)) {
            data.remove(field);
        }
    }
    Ok(())
}

fn leading_current(data: &Record, field: &str, extra: &[Value]) -> Vec<Value> {
    let mut args = Vec::with_capacity(extra.len() + 1);
    if data.has(field) {
        args.push(data.value(field).clone());
    }
    args.extend_from_slice(extra);
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        Record::from_value(value).unwrap()
    }

    #[test]
    fn test_constant_defaults_to_insert_scope() {
        let rules = vec![AutoFillRule::new("status", Fill::Constant(json!(1)))];
        let callbacks = CallbackRegistry::new();

        let mut data = record(json!({"name": "Al"}));
        apply(&rules, &mut data, Operation::Insert, &callbacks).unwrap();
        assert_eq!(data.get("status"), Some(&json!(1)));

        let mut data = record(json!({"name": "Al"}));
        apply(&rules, &mut data, Operation::Update, &callbacks).unwrap();
        assert!(!data.contains_key("status"));
    }

    #[test]
    fn test_field_copies_exactly() {
        let rules = vec![AutoFillRule::new("nickname", Fill::Field("name".to_string()))];
        let mut data = record(json!({"name": "Al"}));
        apply(&rules, &mut data, Operation::Insert, &CallbackRegistry::new()).unwrap();
        assert_eq!(data.get("nickname"), Some(&json!("Al")));
    }

    #[test]
    fn test_ignore_removes_on_identity_only() {
        let rules = vec![AutoFillRule::new("password", Fill::Ignore(json!(""))).scope(Scope::Both)];
        let callbacks = CallbackRegistry::new();

        let mut data = record(json!({"password": ""}));
        apply(&rules, &mut data, Operation::Update, &callbacks).unwrap();
        assert!(!data.contains_key("password"));

        // 0 is loosely empty but not identical to ""
        let mut data = record(json!({"password": 0}));
        apply(&rules, &mut data, Operation::Update, &callbacks).unwrap();
        assert_eq!(data.get("password"), Some(&json!(0)));
    }

    #[test]
    fn test_function_receives_current_value_first() {
        let rules = vec![AutoFillRule::new(
            "name",
            Fill::function(|args: &[Value]| {
                json!(format!("{}-{}", args[0].as_str().unwrap_or(""), args[1]))
            })
            .with_args(vec![json!(2)]),
        )];
        let mut data = record(json!({"name": "al"}));
        apply(&rules, &mut data, Operation::Insert, &CallbackRegistry::new()).unwrap();
        assert_eq!(data.get("name"), Some(&json!("al-2")));
    }

    #[test]
    fn test_function_without_current_value() {
        let rules = vec![AutoFillRule::new(
            "created",
            Fill::function(|args: &[Value]| json!(args.len())),
        )];
        let mut data = record(json!({}));
        apply(&rules, &mut data, Operation::Insert, &CallbackRegistry::new()).unwrap();
        assert_eq!(data.get("created"), Some(&json!(0)));
    }

    #[test]
    fn test_false_result_removes_field() {
        let mut callbacks = CallbackRegistry::new();
        callbacks.register("drop", |_args: &[Value]| json!(false));
        let rules = vec![AutoFillRule::new("token", Fill::callback("drop"))];
        let mut data = record(json!({"token": "abc"}));
        apply(&rules, &mut data, Operation::Insert, &callbacks).unwrap();
        assert!(!data.contains_key("token"));
    }
}
