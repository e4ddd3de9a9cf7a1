//! Rule evaluation over a candidate record.
//!
//! Non-batch validation stops at the first failing rule and reports its message.
//! Batch validation runs every rule, keeps the first failing message per field key and
//! reports them all.

use crate::callback::CallbackRegistry;
use crate::error::{ModelError, ModelResult, ValidationErrors};
use crate::query::PrimaryKey;
use crate::validation::check::check_value;
use crate::validation::rule::{Check, Operation, Trigger, ValidationRule};
use crate::value::{is_empty, loose_eq, to_text, Condition, Record, Value, Where};
use indexmap::IndexMap;

/// Existence probe used by `unique` rules
pub trait UniqueLookup {
    /// True when a row matching `conditions` exists
    fn row_exists(&self, conditions: Where) -> ModelResult<bool>;
}

/// Everything a rule may need beyond the record itself
pub struct ValidationContext<'a> {
    pub primary_key: &'a PrimaryKey,
    pub callbacks: &'a CallbackRegistry,
    pub lookup: &'a dyn UniqueLookup,
    /// Collect every field's first error instead of stopping
    pub batch: bool,
}

/// Run `rules` that apply to `operation` against `data`
///
/// # Errors
///
/// Returns `ModelError::Validation` with the collected messages, or the error of a
/// callback or unique lookup that could not run.
pub fn validate(
    rules: &[ValidationRule],
    data: &Record,
    operation: Operation,
    ctx: &ValidationContext<'_>,
) -> ModelResult<()> {
    let mut errors: IndexMap<String, String> = IndexMap::new();

    for rule in rules.iter().filter(|r| r.scope.applies_to(operation)) {
        if !is_triggered(rule, data) {
            continue;
        }
        let key = rule.error_key();
        if ctx.batch && errors.contains_key(&key) {
            continue;
        }
        if !evaluate(rule, data, ctx)? {
            log::debug!("Validation rule on {} failed: {}", key, rule.message);
            if !ctx.batch {
                return Err(ModelError::Validation(ValidationErrors::Single(
                    rule.message.clone(),
                )));
            }
            errors.insert(key, rule.message.clone());
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ModelError::Validation(ValidationErrors::Fields(errors)))
    }
}

fn is_triggered(rule: &ValidationRule, data: &Record) -> bool {
    match rule.trigger {
        Trigger::Must => true,
        Trigger::NonEmpty => rule
            .fields
            .iter()
            .all(|f| !to_text(data.value(f)).trim().is_empty()),
        Trigger::Exists => rule.fields.iter().all(|f| data.has(f)),
    }
}

/// First argument of function and callback checks
fn subject(rule: &ValidationRule, data: &Record) -> Value {
    if rule.fields.len() > 1 {
        data.pick(&rule.fields).into_value()
    } else {
        data.value(rule.field()).clone()
    }
}

fn with_subject(subject: Value, extra: &[Value]) -> Vec<Value> {
    let mut args = Vec::with_capacity(extra.len() + 1);
    args.push(subject);
    args.extend_from_slice(extra);
    args
}

fn evaluate(rule: &ValidationRule, data: &Record, ctx: &ValidationContext<'_>) -> ModelResult<bool> {
    match &rule.check {
        Check::Function { func, args } => Ok(func(&with_subject(subject(rule, data), args))),
        Check::Callback { name, args } => {
            let result = ctx
                .callbacks
                .call(name, &with_subject(subject(rule, data), args))?;
            Ok(result != Value::Bool(false))
        }
        Check::Confirm(other) => Ok(loose_eq(data.value(rule.field()), data.value(other))),
        Check::Unique => {
            let mut conditions = Where::new();
            for field in &rule.fields {
                conditions.insert(field.clone(), Condition::Eq(data.value(field).clone()));
            }
            if let Some(pk) = ctx.primary_key.as_single() {
                let current = data.value(pk);
                if !is_empty(current) {
                    conditions.insert(pk, Condition::op("neq", current.clone()));
                }
            }
            Ok(!ctx.lookup.row_exists(conditions)?)
        }
        check => Ok(check_value(data.value(rule.field()), check).unwrap_or(true)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::rule::Scope;
    use serde_json::json;
    use std::cell::RefCell;

    struct Lookup {
        taken: bool,
        seen: RefCell<Vec<Where>>,
    }

    impl UniqueLookup for Lookup {
        fn row_exists(&self, conditions: Where) -> ModelResult<bool> {
            self.seen.borrow_mut().push(conditions);
            Ok(self.taken)
        }
    }

    fn lookup(taken: bool) -> Lookup {
        Lookup {
            taken,
            seen: RefCell::new(Vec::new()),
        }
    }

    fn run(rules: &[ValidationRule], data: serde_json::Value, batch: bool) -> ModelResult<()> {
        let pk = PrimaryKey::default();
        let callbacks = CallbackRegistry::new();
        let probe = lookup(false);
        let ctx = ValidationContext {
            primary_key: &pk,
            callbacks: &callbacks,
            lookup: &probe,
            batch,
        };
        validate(rules, &Record::from_value(data).unwrap(), Operation::Insert, &ctx)
    }

    #[test]
    fn test_must_runs_on_absent_field() {
        let rules = vec![ValidationRule::new("name", Check::regex("require"), "name required")
            .trigger(Trigger::Must)];
        assert_eq!(
            run(&rules, json!({"age": 3}), false).unwrap_err(),
            ModelError::Validation(ValidationErrors::Single("name required".to_string()))
        );
    }

    #[test]
    fn test_exists_skips_absent_field() {
        let rules = vec![ValidationRule::new("name", Check::regex("require"), "name required")];
        assert!(run(&rules, json!({"age": 3}), false).is_ok());
        assert!(run(&rules, json!({"name": null}), false).is_ok());
    }

    #[test]
    fn test_non_empty_trigger() {
        let rules = vec![ValidationRule::new("email", Check::regex("email"), "bad email")
            .trigger(Trigger::NonEmpty)];
        assert!(run(&rules, json!({"email": "  "}), false).is_ok());
        assert!(run(&rules, json!({"email": "nope"}), false).is_err());
    }

    #[test]
    fn test_batch_first_error_per_field_wins() {
        let rules = vec![
            ValidationRule::new("name", Check::regex("require"), "name required")
                .trigger(Trigger::Must),
            ValidationRule::new("name", Check::Length(crate::validation::LengthRule::Exact(9)), "name length")
                .trigger(Trigger::Must),
            ValidationRule::new("email", Check::regex("email"), "bad email"),
        ];
        let err = run(&rules, json!({"email": "x"}), true).unwrap_err();
        let ModelError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors.len(), 2);
        assert_eq!(errors.get("name"), Some("name required"));
        assert_eq!(errors.get("email"), Some("bad email"));
    }

    #[test]
    fn test_non_batch_stops_at_first_failure() {
        let rules = vec![
            ValidationRule::new("a", Check::regex("number"), "a numeric"),
            ValidationRule::new("b", Check::regex("number"), "b numeric"),
        ];
        assert_eq!(
            run(&rules, json!({"a": "x", "b": "y"}), false).unwrap_err(),
            ModelError::Validation(ValidationErrors::Single("a numeric".to_string()))
        );
    }

    #[test]
    fn test_scope_filters_rules() {
        let rules = vec![ValidationRule::new("name", Check::regex("require"), "name required")
            .trigger(Trigger::Must)
            .scope(Scope::Update)];
        assert!(run(&rules, json!({}), false).is_ok());
    }

    #[test]
    fn test_confirm() {
        let rules = vec![ValidationRule::new(
            "repassword",
            Check::Confirm("password".to_string()),
            "passwords differ",
        )];
        assert!(run(&rules, json!({"password": "a1", "repassword": "a1"}), false).is_ok());
        assert!(run(&rules, json!({"password": "a1", "repassword": "a2"}), false).is_err());
    }

    #[test]
    fn test_function_with_multiple_fields() {
        let rules = vec![ValidationRule::new(
            "start,end",
            Check::function(|args: &[Value]| args[0]["start"].as_i64() < args[0]["end"].as_i64()),
            "start after end",
        )];
        assert!(run(&rules, json!({"start": 1, "end": 2}), false).is_ok());
        assert!(run(&rules, json!({"start": 3, "end": 2}), false).is_err());
        // exists-mode needs every field
        assert!(run(&rules, json!({"start": 3}), false).is_ok());
    }

    #[test]
    fn test_callback_fails_only_on_false() {
        let pk = PrimaryKey::default();
        let mut callbacks = CallbackRegistry::new();
        callbacks.register("zero_is_fine", |_args: &[Value]| json!(0));
        callbacks.register("reject", |_args: &[Value]| json!(false));
        let probe = lookup(false);
        let ctx = ValidationContext {
            primary_key: &pk,
            callbacks: &callbacks,
            lookup: &probe,
            batch: false,
        };
        let data = Record::from_value(json!({"name": "Al"})).unwrap();

        let ok = vec![ValidationRule::new("name", Check::callback("zero_is_fine"), "no")];
        assert!(validate(&ok, &data, Operation::Insert, &ctx).is_ok());

        let bad = vec![ValidationRule::new("name", Check::callback("reject"), "rejected")];
        assert!(validate(&bad, &data, Operation::Insert, &ctx).is_err());

        let missing = vec![ValidationRule::new("name", Check::callback("nope"), "x")];
        assert_eq!(
            validate(&missing, &data, Operation::Insert, &ctx).unwrap_err(),
            ModelError::UnknownMethod("nope".to_string())
        );
    }

    #[test]
    fn test_unique_excludes_current_key_on_edit() {
        let pk = PrimaryKey::default();
        let callbacks = CallbackRegistry::new();
        let probe = lookup(true);
        let ctx = ValidationContext {
            primary_key: &pk,
            callbacks: &callbacks,
            lookup: &probe,
            batch: false,
        };
        let rules = vec![ValidationRule::new("email", Check::Unique, "email taken")];
        let data = Record::from_value(json!({"id": 7, "email": "a@b.c"})).unwrap();

        assert!(validate(&rules, &data, Operation::Update, &ctx).is_err());
        let seen = probe.seen.borrow();
        assert_eq!(seen[0].get("email"), Some(&Condition::Eq(json!("a@b.c"))));
        assert_eq!(seen[0].get("id"), Some(&Condition::op("neq", 7)));
    }
}
